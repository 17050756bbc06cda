use crate::exit::{CliResult, SUCCESS};

pub fn run() -> CliResult<i32> {
    println!("haptik {}", env!("CARGO_PKG_VERSION"));
    println!("protocol message version {}", haptik_proto::CURRENT_MESSAGE_VERSION);
    Ok(SUCCESS)
}
