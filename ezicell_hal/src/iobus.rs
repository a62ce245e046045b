/// Status code reported by the bus driver when a call fails.
pub type BusCode = i32;

pub const BUS_NOT_OPEN: BusCode = 1;
pub const BUS_INVALID_SLAVE: BusCode = 3;
pub const BUS_DISCONNECTED: BusCode = 5;
pub const BUS_TIMEOUT: BusCode = 6;

/// # IoBus
/// Transport towards the EziIO modules. One bus carries
/// any number of modules, each addressed by its device
/// (slave) id, which is bound to an IP during connect_tcp.
///
/// Input and output words are returned as (value, aux):
/// * get_input:  (inputs, latch)
/// * get_output: (outputs, status)
#[cfg_attr(feature = "mock", mockall::automock)]
pub trait IoBus: Send + Sync
{
    fn connect_tcp(&self, ip: [u8; 4], device_id: u32) -> bool;
    fn close(&self, device_id: u32);
    fn set_auto_reconnect(&self, enabled: bool);

    fn get_input(&self, device_id: u32) -> Result<(u32, u32), BusCode>;
    fn clear_latch(&self, device_id: u32, latch_mask: u32) -> Result<(), BusCode>;

    fn get_output(&self, device_id: u32) -> Result<(u32, u32), BusCode>;
    fn set_output(&self, device_id: u32, set_mask: u32, clear_mask: u32) -> Result<(), BusCode>;
}
