use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use rov_fc::cancel::CancelToken;
use rov_fc::control::{ChannelOverride, ManualInput};
use rov_fc::link::VehicleLink;
use rov_fc::session::Session;
use rov_fc::state::VehicleStatus;
use rov_fc::{FcConfig, FcError};

/// Exit code when the vehicle answers a mode change with anything but accepted.
const EXIT_MODE_REJECTED: u8 = 8;

#[derive(Debug, Parser)]
#[command(name = "rovcmd", version, about = "Command an ArduPilot vehicle over MAVLink")]
struct Cli {
    /// TOML config file with an [fc] section
    #[arg(long)]
    config: Option<String>,

    /// Override fc.endpoint, e.g. udpin:0.0.0.0:14550 or serial:/dev/ttyACM0:115200
    #[arg(long)]
    endpoint: Option<String>,

    /// Give up if no heartbeat arrives within this many milliseconds
    #[arg(long)]
    heartbeat_timeout_ms: Option<u64>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Wait for the vehicle heartbeat and print its identity.
    Heartbeat,
    Arm,
    Disarm,
    /// Change flight mode and wait for the acknowledgment.
    Mode { name: String },
    /// List the mode table for the connected vehicle.
    Modes,
    /// Send MANUAL_CONTROL; with --hz and --duration-ms, stream it.
    Manual {
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        x: i32,
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        y: i32,
        #[arg(long, default_value_t = 500, allow_negative_numbers = true)]
        z: i32,
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        r: i32,
        #[arg(long, default_value_t = 0)]
        buttons: u16,
        #[arg(long)]
        hz: Option<f32>,
        #[arg(long, default_value_t = 1000)]
        duration_ms: u64,
    },
    /// Override one RC channel (1-18). The other channels are not overridden by this frame.
    Servo {
        #[arg(long, allow_negative_numbers = true)]
        channel: i32,
        #[arg(long)]
        pwm: u16,
    },
    /// Listen to telemetry and print the vehicle status.
    Status {
        #[arg(long, default_value_t = 2000)]
        listen_ms: u64,
    },
}

#[derive(Debug, Default, serde::Deserialize)]
struct Config {
    fc: Option<FcConfig>,
}

fn parse_config(s: &str) -> Result<Config> {
    toml::from_str(s).context("parse config toml")
}

fn load_config(path: Option<&str>) -> Result<Config> {
    let Some(path) = path else { return Ok(Config::default()); };
    let s = std::fs::read_to_string(path).with_context(|| format!("read config {}", path))?;
    parse_config(&s)
}

fn resolve_fc(cli: &Cli) -> Result<FcConfig> {
    let mut fc = load_config(cli.config.as_deref())?.fc.unwrap_or_default();
    if let Some(ep) = &cli.endpoint {
        fc.endpoint = ep.clone();
    }
    if let Some(ms) = cli.heartbeat_timeout_ms {
        fc.heartbeat_timeout_ms = Some(ms);
    }
    Ok(fc)
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(exit_code_for(&e))
        }
    }
}

fn exit_code_for(e: &anyhow::Error) -> u8 {
    e.downcast_ref::<FcError>().map(FcError::exit_code).unwrap_or(1)
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let fc = resolve_fc(&cli)?;

    let cancel = CancelToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling");
            on_signal.cancel();
        }
    });

    // Session waits block, so the whole session lives on the blocking pool.
    let cmd = cli.cmd;
    tokio::task::spawn_blocking(move || fc_cmd(&fc, cmd, cancel))
        .await
        .context("session task")?
}

fn fc_cmd(cfg: &FcConfig, cmd: Command, cancel: CancelToken) -> Result<ExitCode> {
    // Reject bad arguments before touching the link.
    match &cmd {
        Command::Manual { x, y, z, r, buttons, .. } => {
            ManualInput::new(*x, *y, *z, *r, *buttons)?;
        }
        Command::Servo { channel, pwm } => {
            ChannelOverride::single(*channel, *pwm)?;
        }
        _ => {}
    }

    info!("connecting to {}", cfg.endpoint);
    let mut session = Session::connect(cfg, cancel)?;
    let code = dispatch(&mut session, cmd)?;
    session.close();
    Ok(code)
}

fn dispatch<L: VehicleLink>(session: &mut Session<L>, cmd: Command) -> Result<ExitCode> {
    match cmd {
        Command::Heartbeat => {
            let st = session.status();
            println!("system_id={:?} component_id={:?}", st.system_id, st.component_id);
            println!("kind={:?} armed={} mode={:?}", st.kind, st.armed, st.mode);
        }
        Command::Arm => {
            session.arm()?;
            println!("armed");
        }
        Command::Disarm => {
            session.disarm()?;
            println!("disarmed");
        }
        Command::Mode { name } => {
            let result = session.set_mode(&name)?;
            println!("mode {}: {}", name.to_ascii_uppercase(), result);
            if !result.is_accepted() {
                return Ok(ExitCode::from(EXIT_MODE_REJECTED));
            }
        }
        Command::Modes => {
            for (name, id) in session.mode_table().iter() {
                println!("{:>3} {}", id, name);
            }
        }
        Command::Manual { x, y, z, r, buttons, hz, duration_ms } => {
            let input = ManualInput::new(x, y, z, r, buttons)?;
            match hz {
                Some(hz) => {
                    anyhow::ensure!(hz > 0.0 && hz <= 200.0, "--hz must be in (0, 200]");
                    let period = Duration::from_secs_f32(1.0 / hz);
                    let n = session.hold_manual(input, period, Duration::from_millis(duration_ms))?;
                    println!("manual: sent {} frames", n);
                }
                None => {
                    session.send_manual(input)?;
                    println!("manual: sent");
                }
            }
        }
        Command::Servo { channel, pwm } => {
            session.set_channel_pwm(channel, pwm)?;
            println!("channel {} -> {}", channel, pwm);
        }
        Command::Status { listen_ms } => {
            session.pump(Duration::from_millis(listen_ms))?;
            print_status(session.status());
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn print_status(st: &VehicleStatus) {
    println!("connected={}", st.connected);
    println!("system_id={:?} kind={:?}", st.system_id, st.kind);
    println!("armed={} mode={:?} custom_mode={:?}", st.armed, st.mode, st.custom_mode);
    println!(
        "battery voltage={:?} current={:?} remaining={:?}",
        st.battery.voltage, st.battery.current, st.battery.remaining
    );
    println!("heading_deg={:?}", st.heading_deg);
    println!("last_heartbeat_age={:?}", st.hb_age());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_axes_parse() {
        let cli = Cli::try_parse_from(["rovcmd", "manual", "--x", "-300", "--r", "-1000", "--hz", "10"]).unwrap();
        match cli.cmd {
            Command::Manual { x, y, z, r, hz, duration_ms, .. } => {
                assert_eq!((x, y, z, r), (-300, 0, 500, -1000));
                assert_eq!(hz, Some(10.0));
                assert_eq!(duration_ms, 1000);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn endpoint_flag_overrides_config() {
        let cli = Cli::try_parse_from(["rovcmd", "--endpoint", "udpout:10.0.0.2:14550", "arm"]).unwrap();
        let fc = resolve_fc(&cli).unwrap();
        assert_eq!(fc.endpoint, "udpout:10.0.0.2:14550");
        assert_eq!(fc.heartbeat_timeout_ms, None);
    }

    #[test]
    fn config_without_fc_section() {
        let cfg = parse_config("").unwrap();
        assert!(cfg.fc.is_none());

        let cfg = parse_config("[fc]\nendpoint = \"tcpout:127.0.0.1:5760\"\narm_timeout_ms = 8000\n").unwrap();
        let fc = cfg.fc.unwrap();
        assert_eq!(fc.endpoint, "tcpout:127.0.0.1:5760");
        assert_eq!(fc.arm_timeout_ms, 8000);
        assert_eq!(fc.ack_timeout_ms, 3000);
    }

    #[test]
    fn bad_arguments_fail_before_connecting() {
        let cfg = FcConfig { endpoint: "nonsense".into(), ..FcConfig::default() };
        let err = fc_cmd(
            &cfg,
            Command::Manual { x: 1500, y: 0, z: 0, r: 0, buttons: 0, hz: None, duration_ms: 0 },
            CancelToken::new(),
        )
        .unwrap_err();
        assert_eq!(exit_code_for(&err), 4);

        let err = fc_cmd(&cfg, Command::Servo { channel: 19, pwm: 1500 }, CancelToken::new()).unwrap_err();
        assert_eq!(exit_code_for(&err), 5);

        let err = fc_cmd(&cfg, Command::Arm, CancelToken::new()).unwrap_err();
        assert_eq!(exit_code_for(&err), 2);
    }

    #[test]
    fn non_fc_errors_exit_one() {
        let err = parse_config("fc = 3").unwrap_err();
        assert_eq!(exit_code_for(&err), 1);
    }
}
