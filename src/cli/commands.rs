use clap::{Arg, ArgAction, ArgMatches, Command};
use log::info;

use crate::config::Config;
use crate::devices::convert;
use crate::modbus::protocol::{decode, ModbusRequest};
use crate::services::{BridgeService, CycleOutcome};
use crate::utils::error::ModbusError;

pub fn build_cli() -> Command {
    Command::new("plc_twist_bridge")
        .version(crate::VERSION)
        .about(
            "Reads velocity registers from a PLC over Modbus TCP \
             and publishes them as twist commands",
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("TOML configuration file"),
        )
        .arg(Arg::new("host").long("host").value_name("HOST").help("PLC address"))
        .arg(Arg::new("port").short('p').long("port").value_name("PORT").help("Modbus TCP port"))
        .arg(Arg::new("unit-id").short('u').long("unit-id").value_name("ID").help("Modbus unit id"))
        .arg(
            Arg::new("interval-ms")
                .short('i')
                .long("interval-ms")
                .value_name("MS")
                .help("Polling interval"),
        )
        .arg(
            Arg::new("timeout-ms")
                .long("timeout-ms")
                .value_name("MS")
                .help("Connect and exchange timeout"),
        )
        .arg(
            Arg::new("format")
                .short('f')
                .long("format")
                .value_name("FORMAT")
                .value_parser(["console", "json", "csv"])
                .help("Output format"),
        )
        .arg(
            Arg::new("output-file")
                .short('o')
                .long("output-file")
                .value_name("PATH")
                .help("Also append output to a file"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Debug logging"),
        )
        .subcommand(Command::new("run").about("Poll and publish until Ctrl-C (default)"))
        .subcommand(Command::new("read-once").about("Run a single read and publish cycle"))
        .subcommand(
            Command::new("encode")
                .about("Print the request frame as hex")
                .arg(
                    Arg::new("transaction-id")
                        .short('t')
                        .long("transaction-id")
                        .value_name("ID")
                        .default_value("1"),
                ),
        )
        .subcommand(
            Command::new("decode")
                .about("Decode a response frame given as hex and convert it to a twist")
                .arg(Arg::new("hex").required(true).num_args(1..).value_name("HEX")),
        )
        .subcommand(
            Command::new("save-config")
                .about("Write the effective configuration to a TOML file")
                .arg(Arg::new("path").required(true).value_name("PATH")),
        )
}

pub async fn handle_subcommands(matches: &ArgMatches, config: Config) -> Result<(), ModbusError> {
    match matches.subcommand() {
        Some(("read-once", _)) => {
            info!("🔍 Executing read-once command...");
            let mut service = BridgeService::new(config)?;
            match service.run_cycle().await {
                CycleOutcome::Published(_) => Ok(()),
                CycleOutcome::Skipped(e) => Err(e),
            }
        }
        Some(("encode", sub)) => {
            let raw = sub
                .get_one::<String>("transaction-id")
                .map(String::as_str)
                .unwrap_or("1");
            let transaction_id: u16 = raw.parse().map_err(|_| {
                ModbusError::ConfigError(format!("Invalid transaction id '{}'", raw))
            })?;

            let request = ModbusRequest::read_holding_registers(
                transaction_id,
                config.unit_id,
                config.start_address,
                config.register_count,
            );
            request.validate()?;
            println!("{}", spaced_hex(&request.encode()));
            Ok(())
        }
        Some(("decode", sub)) => {
            let text: String = sub
                .get_many::<String>("hex")
                .into_iter()
                .flatten()
                .map(String::as_str)
                .collect();
            let frame = parse_hex(&text)?;

            let registers = decode(&frame)?;
            println!("📊 Registers: {:?}", registers);

            let twist = convert(&registers)?;
            for (name, value) in twist.components() {
                println!("   {:<10} {:>9.3}", name, value);
            }
            Ok(())
        }
        Some(("save-config", sub)) => {
            if let Some(path) = sub.get_one::<String>("path") {
                config.save_to_file(path)?;
                println!("✅ Configuration written to {}", path);
            }
            Ok(())
        }
        _ => {
            let mut service = BridgeService::new(config)?;
            service.run().await
        }
    }
}

fn spaced_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Accepts "00 01 ..." as well as "0001...".
fn parse_hex(text: &str) -> Result<Vec<u8>, ModbusError> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(compact)
        .map_err(|e| ModbusError::MalformedResponse(format!("Invalid hex input: {}", e)))
}
