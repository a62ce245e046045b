use std::io::{self, BufRead};

use ezicell_core::trace::trace_helper::TraceHelper;
use pneumatic::PneumaticManager;

#[derive(Debug, Clone, PartialEq)]
pub enum Command
{
    Extend(String),
    Retract(String),
    State(Option<String>),
    Reset,
    Io(u32),
    Help,
    Quit
}

const HELP: &str = "commands: extend <slide> | retract <slide> | state [slide] | reset | io <device-id> | help | quit";

impl Command
{
    pub fn parse(line: &str) -> Result<Command, String>
    {
        let mut words = line.split_whitespace();
        let verb = words.next().ok_or_else(|| "empty command".to_string())?;
        let arg = words.next();

        match (verb, arg)
        {
            ("extend", Some(slide)) => Ok(Command::Extend(slide.to_string())),
            ("retract", Some(slide)) => Ok(Command::Retract(slide.to_string())),
            ("extend", None) | ("retract", None) => Err(format!("{} needs a slide name", verb)),
            ("state", slide) => Ok(Command::State(slide.map(str::to_string))),
            ("reset", None) => Ok(Command::Reset),
            ("io", Some(id)) => id.parse::<u32>()
                                  .map(Command::Io)
                                  .map_err(|_| format!("invalid device id: {}", id)),
            ("io", None) => Err("io needs a device id".to_string()),
            ("help", _) => Ok(Command::Help),
            ("quit", _) | ("exit", _) => Ok(Command::Quit),
            _ => Err(format!("unknown command: {}", line.trim()))
        }
    }
}

/// # Console
/// Operator console on stdin. Each line is one command; the
/// answer goes to stdout, state changes show up in the trace.
pub struct Console<'a>
{
    pneumatic: &'a PneumaticManager,
    tracer: TraceHelper
}

impl<'a> Console<'a>
{
    pub fn new(pneumatic: &'a PneumaticManager) -> Self
    {
        Console
        {
            pneumatic,
            tracer: TraceHelper::new("ARM/Console")
        }
    }

    /// Reads commands until quit or end of input.
    pub fn run(&self)
    {
        println!("{}", HELP);
        let stdin = io::stdin();
        for line in stdin.lock().lines()
        {
            let line = match line
            {
                Ok(line) => line,
                Err(e) => {
                    self.tracer.error(format!("Cannot read stdin: {}", e));
                    break;
                }
            };

            if line.trim().is_empty()
            {
                continue;
            }

            match Command::parse(&line)
            {
                Ok(Command::Quit) => break,
                Ok(command) => println!("{}", self.execute(&command)),
                Err(msg) => println!("{}\n{}", msg, HELP)
            }
        }
    }

    pub fn execute(&self, command: &Command) -> String
    {
        match command
        {
            Command::Extend(slide) => match self.pneumatic.extend_slide(slide)
            {
                Ok(()) => format!("{} extending", slide),
                Err(e) => format!("extend failed: {}", e)
            },
            Command::Retract(slide) => match self.pneumatic.retract_slide(slide)
            {
                Ok(()) => format!("{} retracting", slide),
                Err(e) => format!("retract failed: {}", e)
            },
            Command::State(Some(slide)) => match self.pneumatic.get_slide_state(slide)
            {
                Some(state) => format!("{}: {}", slide, state),
                None => format!("unknown slide: {}", slide)
            },
            Command::State(None) => self.pneumatic
                                        .get_slide_names()
                                        .iter()
                                        .filter_map(|name| self.pneumatic.get_slide_state(name).map(|s| format!("{}: {}", name, s)))
                                        .collect::<Vec<_>>()
                                        .join("\n"),
            Command::Reset => {
                self.pneumatic.reset_all_slides();
                "all slides reset".to_string()
            }
            Command::Io(id) => match self.pneumatic.io_manager().get_device(*id)
            {
                Some(device) => {
                    let inputs = device.get_last_input_status();
                    let outputs = device.get_last_output_status();
                    format!("{} (ID: {}, {}): inputs {:#010x} latch {:#010x} outputs {:#010x}",
                            device.name(), device.id(),
                            if device.is_connected() { "connected" } else { "disconnected" },
                            inputs.inputs, inputs.latch, outputs.outputs)
                }
                None => format!("unknown device: {}", id)
            },
            Command::Help => HELP.to_string(),
            Command::Quit => String::new()
        }
    }
}
