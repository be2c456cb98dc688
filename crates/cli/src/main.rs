//! Node agent that brings the local host into or out of a Kubernetes cluster.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

mod commands;
mod error;
mod signals;

/// Helpers invoked by phase scripts.
pub mod advanced;

/// Probes for other agents managed by `systemctl`.
pub mod systemctl;

use error::{Error, Result};

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use nodelet_config::{ClusterRole, ConfigOverrides, ServiceState};

#[tokio::main(worker_threads = 4)]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None => commands::daemon(cli.daemon).await,
        Some(Commands::Phases { command }) => commands::phases(command).await,
        Some(Commands::Init) => commands::init(),
        Some(Commands::Advanced { command }) => {
            commands::advanced(command);
            Ok(())
        }
        Some(Commands::Version) => {
            println!("nodeletd {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "nodeletd", version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    daemon: DaemonArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Commands related to the phases that bring up the Kubernetes stack
    Phases {
        #[command(subcommand)]
        command: PhasesCommand,
    },
    /// Extract the bundled scripts and units
    Init,
    /// Helpers used by the phase scripts
    Advanced {
        #[command(subcommand)]
        command: AdvancedCommand,
    },
    /// Print version information
    Version,
}

#[allow(clippy::struct_excessive_bools)]
#[derive(Clone, Debug, Default, clap::Args)]
struct DaemonArgs {
    /// Run with more verbose logging enabled
    #[arg(long)]
    debug: bool,

    /// Path to the config directory or file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Base directory of the phase scripts
    #[arg(long = "scripts")]
    scripts: Option<PathBuf>,

    /// Extension file the observed state is persisted to
    #[arg(long = "extfile")]
    extfile: Option<PathBuf>,

    /// Where the kube.env symlink is created
    #[arg(long = "kube.env")]
    kube_env: Option<PathBuf>,

    /// Time between two reconcile ticks, e.g. `60`, `90s` or `2m`
    #[arg(long, value_parser = parse_duration)]
    loop_interval: Option<Duration>,

    /// Host ID, overriding the config file
    #[arg(long)]
    host: Option<String>,

    /// Cluster ID, overriding the config file
    #[arg(long)]
    cluster: Option<String>,

    /// Cluster role of the host: master, worker or none
    #[arg(long)]
    role: Option<ClusterRole>,

    /// Desired service state: true, false or ignore
    #[arg(long)]
    kube_service_state: Option<ServiceState>,

    /// Run a single reconcile tick and exit
    #[arg(long)]
    disable_loop: bool,

    /// Disable status reporting to the conductor
    #[arg(long)]
    disable_sunpike: bool,

    /// Disable persisting state to the extension file
    #[arg(long = "disable-extfile")]
    disable_extfile: bool,

    /// Disable running all phase scripts
    #[arg(long)]
    disable_scripts: bool,

    /// Do not apply configuration received from the conductor
    #[arg(long = "disable-configupdate")]
    disable_configupdate: bool,

    /// kube.env generated from the conductor's configuration
    #[arg(long = "kube_sunpike.env")]
    kube_sunpike_env: Option<PathBuf>,

    /// Configuration received from the conductor
    #[arg(long = "config_sunpike")]
    config_sunpike: Option<PathBuf>,
}

impl DaemonArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            debug: self.debug,
            phase_scripts_dir: self.scripts.clone(),
            extension_output_file: self.extfile.clone(),
            kube_env_path: self.kube_env.clone(),
            sunpike_kube_env_path: self.kube_sunpike_env.clone(),
            sunpike_config_path: self.config_sunpike.clone(),
            loop_interval: self.loop_interval.map(|d| d.as_secs()),
            host_id: self.host.clone(),
            cluster_id: self.cluster.clone(),
            role: self.role,
            kube_service_state: self.kube_service_state,
            disable_loop: self.disable_loop,
            disable_sunpike: self.disable_sunpike,
            disable_ext_file: self.disable_extfile,
            disable_scripts: self.disable_scripts,
            disable_config_update: self.disable_configupdate,
            ..ConfigOverrides::default()
        }
    }
}

#[derive(Clone, Debug, Subcommand)]
enum PhasesCommand {
    /// List the phases and their index numbers
    List,
    /// Start the stack, optionally from a given phase
    Start(StartArgs),
    /// Stop the stack, optionally down to a given phase
    Stop(StopArgs),
    /// Stop then start the stack
    Restart(RestartArgs),
    /// Check the status of the stack on this host
    Status(StatusArgs),
}

#[derive(Clone, Debug, clap::Args)]
struct StartArgs {
    /// 1-based number of the phase to start from; see `phases list`
    #[arg(short = 'p', long = "from-phase", default_value_t = 0)]
    phase: usize,

    /// Operate on the given phase only
    #[arg(long)]
    single: bool,

    /// Print more information
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Debug, clap::Args)]
struct StopArgs {
    /// 1-based number of the phase to stop down to; see `phases list`
    #[arg(short = 'p', long = "till-phase", default_value_t = 0)]
    phase: usize,

    /// Operate on the given phase only
    #[arg(long)]
    single: bool,

    /// Stop every phase even when some fail to stop
    #[arg(long)]
    force: bool,

    /// Print more information
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Debug, clap::Args)]
struct RestartArgs {
    /// 1-based number of the phase to restart from; see `phases list`
    #[arg(short = 'p', long = "from-phase", default_value_t = 0)]
    phase: usize,

    /// Operate on the given phase only
    #[arg(long)]
    single: bool,

    /// Regenerate certificates while stopping and starting
    #[arg(long)]
    regen_certs: bool,

    /// Print more information
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Debug, clap::Args)]
struct StatusArgs {
    /// 1-based number of a single phase to check
    #[arg(short = 'p', long)]
    phase: Option<usize>,

    /// Print more information
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Debug, Subcommand)]
enum AdvancedCommand {
    /// Print whether each address is an IPv6 address
    IsV6 { addresses: Vec<String> },
    /// Print the nth address of a CIDR
    AddrConv {
        cidr: String,
        #[arg(allow_hyphen_values = true)]
        n: String,
    },
    /// Print whether the argument is an IP address or a DNS name
    IpType { address: String },
}

/// Parses plain seconds or a duration such as `90s`, `2m` or `1m30s`.
fn parse_duration(value: &str) -> Result<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Ok(Duration::from_secs(seconds));
    }
    humantime::parse_duration(value).map_err(|e| Error::InvalidDuration(value.to_string(), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("60").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_duration("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("m").is_err());
        assert!(matches!(parse_duration("5 parsecs"), Err(Error::InvalidDuration(..))));
    }

    #[test]
    fn test_parse_compound_duration() {
        assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("1h 5m").unwrap(), Duration::from_secs(3900));
        assert_eq!(parse_duration("2min").unwrap(), Duration::from_secs(120));
    }

    #[test]
    fn test_daemon_flags_become_overrides() {
        let cli = Cli::try_parse_from([
            "nodeletd",
            "--debug",
            "--kube.env",
            "/tmp/kube.env",
            "--kube_sunpike.env",
            "/tmp/kube_sunpike.env",
            "--config_sunpike",
            "/tmp/config_sunpike.yaml",
            "--loop-interval",
            "2m",
            "--host",
            "host-1",
            "--role",
            "master",
            "--kube-service-state",
            "false",
            "--disable-extfile",
            "--disable-configupdate",
        ])
        .unwrap();
        assert!(cli.command.is_none());

        let overrides = cli.daemon.overrides();

        assert!(overrides.debug);
        assert_eq!(overrides.kube_env_path, Some(PathBuf::from("/tmp/kube.env")));
        assert_eq!(
            overrides.sunpike_kube_env_path,
            Some(PathBuf::from("/tmp/kube_sunpike.env"))
        );
        assert_eq!(
            overrides.sunpike_config_path,
            Some(PathBuf::from("/tmp/config_sunpike.yaml"))
        );
        assert_eq!(overrides.loop_interval, Some(120));
        assert_eq!(overrides.host_id.as_deref(), Some("host-1"));
        assert_eq!(overrides.role, Some(ClusterRole::Master));
        assert_eq!(overrides.kube_service_state, Some(ServiceState::False));
        assert!(overrides.disable_ext_file);
        assert!(overrides.disable_config_update);
        assert!(!overrides.disable_sunpike);
    }

    #[test]
    fn test_phase_subcommands() {
        let cli = Cli::try_parse_from(["nodeletd", "phases", "stop", "-p", "3", "--force"]).unwrap();
        let Some(Commands::Phases {
            command: PhasesCommand::Stop(args),
        }) = cli.command
        else {
            panic!("expected phases stop");
        };
        assert_eq!(args.phase, 3);
        assert!(args.force);
        assert!(!args.single);

        let cli = Cli::try_parse_from(["nodeletd", "phases", "restart", "--regen-certs"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Phases {
                command: PhasesCommand::Restart(RestartArgs {
                    phase: 0,
                    regen_certs: true,
                    ..
                })
            })
        ));
    }

    #[test]
    fn test_negative_addr_conv_position() {
        let cli =
            Cli::try_parse_from(["nodeletd", "advanced", "addr-conv", "10.0.0.0/24", "-2"]).unwrap();

        assert!(matches!(
            cli.command,
            Some(Commands::Advanced {
                command: AdvancedCommand::AddrConv { ref n, .. }
            }) if n == "-2"
        ));
    }
}
