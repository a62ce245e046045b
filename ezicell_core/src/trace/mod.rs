use std::io::Write;

pub mod trace_helper;

/// Installs the process wide trace sink. Messages go to
/// stderr, prefixed with a local timestamp and the name of
/// the component that traced them. The filter follows
/// RUST_LOG and defaults to "info".
///
/// Calling launch a second time has no effect.
pub fn launch()
{
    let result = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(buf, "{} {:<5} {}: {}",
                     chrono::Local::now().format("%H:%M:%S%.3f"),
                     record.level(),
                     record.target(),
                     record.args())
        })
        .try_init();

    if result.is_ok()
    {
        log::info!(target: "Trace", "Trace active");
    }
}
