use crate::AdvancedCommand;
use crate::advanced::{ip_type, is_v6, nth_address};

pub fn advanced(command: AdvancedCommand) {
    match command {
        AdvancedCommand::IsV6 { addresses } => {
            for address in addresses {
                print!("{}", is_v6(&address));
            }
            println!();
        }
        AdvancedCommand::AddrConv { cidr, n } => {
            let address = n
                .trim()
                .parse::<i64>()
                .ok()
                .and_then(|n| nth_address(&cidr, n));
            match address {
                Some(address) => println!("{address}"),
                None => println!("None"),
            }
        }
        AdvancedCommand::IpType { address } => println!("{}", ip_type(&address)),
    }
}
