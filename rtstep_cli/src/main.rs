//! Minimal embedding-surface front-end: opens a [`Session`] against a
//! config file, drives one operation, and closes it again. Meant for
//! manually exercising a machine config and as the driver program behind
//! integration tests — a real host application keeps the session open
//! across many calls instead of re-opening per invocation.

#![deny(warnings)]

mod error;
mod program;

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use rtstep_common::config::load_machine_config;
use rtstep_common::geometry::Pose;
use rtstep_common::protocol::BoardRev;
use rtstep_engine::command::{CommandKind, InterpreterCommand};
use rtstep_engine::session::Session;
use rtstep_hal::dongle::sim::{SimAxisBits, SimDongle};
use rtstep_hal::dongle::Dongle;

use error::CliError;

/// rt-stepper embedding surface
#[derive(Parser, Debug)]
#[command(name = "rtstep_cli")]
#[command(version)]
#[command(about = "Minimal embedding surface for a rt-stepper machine (open/home/mdi/auto/estop)")]
struct Args {
    /// Path to the machine configuration file (TOML).
    #[arg(short, long, default_value = "machine.toml")]
    config: PathBuf,

    /// Which dongle backend to drive.
    #[arg(short, long, value_enum, default_value_t = Driver::Sim)]
    driver: Driver,

    /// Firmware generation to report to the session (gates ADC query and
    /// speed-feed sync availability).
    #[arg(long, value_enum, default_value_t = BoardRevArg::F)]
    board_rev: BoardRevArg,

    /// Enable verbose (DEBUG) logging.
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON.
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Driver {
    Sim,
    Usb,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
#[allow(clippy::upper_case_acronyms)]
enum BoardRevArg {
    A,
    B,
    C,
    D,
    E,
    F,
}

impl From<BoardRevArg> for BoardRev {
    fn from(v: BoardRevArg) -> Self {
        match v {
            BoardRevArg::A => BoardRev::A,
            BoardRevArg::B => BoardRev::B,
            BoardRevArg::C => BoardRev::C,
            BoardRevArg::D => BoardRev::D,
            BoardRevArg::E => BoardRev::E,
            BoardRevArg::F => BoardRev::F,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the homing sequence.
    Home,
    /// Report position, homed/estop/pause state.
    Status,
    /// Raise emergency stop.
    Estop,
    /// Clear emergency stop (does not re-home).
    EstopReset,
    /// Run a single interpreter command inline (MDI).
    Mdi {
        /// Target X.
        #[arg(allow_hyphen_values = true)]
        x: f64,
        /// Target Y.
        #[arg(allow_hyphen_values = true)]
        y: f64,
        /// Target Z.
        #[arg(allow_hyphen_values = true)]
        z: f64,
        /// Requested velocity.
        vel: f64,
        /// Requested acceleration.
        accel: f64,
    },
    /// Run a program file written in the exercising format (see
    /// [`program`]).
    Auto {
        program: PathBuf,
        /// Preview the resulting position without driving any I/O.
        #[arg(long)]
        verify: bool,
    },
}

fn main() {
    let args = Args::parse();
    setup_tracing(&args);

    if let Err(e) = run(&args) {
        error!("rtstep_cli: {e}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), CliError> {
    let text = fs::read_to_string(&args.config).map_err(|e| CliError::Io {
        path: args.config.display().to_string(),
        source: e,
    })?;
    let config = load_machine_config(&text)?;

    info!(driver = ?args.driver, config = %args.config.display(), "opening session");
    let dongle = open_dongle(args, &config)?;
    let (session, supervisor) = Session::open(config, dongle)?;

    let result = dispatch(&session, &args.command);

    session.close(supervisor);
    result
}

fn open_dongle(
    args: &Args,
    config: &rtstep_common::config::MachineConfig,
) -> Result<Arc<dyn Dongle>, CliError> {
    let board_rev: BoardRev = args.board_rev.into();
    match args.driver {
        Driver::Sim => {
            let axes = config.axes.iter().map(|a| SimAxisBits {
                step_bit: rtstep_common::protocol::PIN_MAP[a.step_pin as usize],
                dir_bit: rtstep_common::protocol::PIN_MAP[a.dir_pin as usize],
                step_active_high: a.step_active_high,
                dir_active_high: a.direction_active_high,
            });
            Ok(Arc::new(SimDongle::new(board_rev, axes)))
        }
        Driver::Usb => open_usb_dongle(board_rev),
    }
}

#[cfg(feature = "rt")]
fn open_usb_dongle(board_rev: BoardRev) -> Result<Arc<dyn Dongle>, CliError> {
    use rtstep_common::consts::{USB_PRODUCT_ID, USB_VENDOR_ID};
    use rtstep_hal::dongle::usb::UsbDongle;

    let handle = rusb::open_device_with_vid_pid(USB_VENDOR_ID, USB_PRODUCT_ID).ok_or(
        CliError::UsbNotFound {
            vid: USB_VENDOR_ID,
            pid: USB_PRODUCT_ID,
        },
    )?;
    Ok(Arc::new(UsbDongle::new(handle, board_rev)))
}

#[cfg(not(feature = "rt"))]
fn open_usb_dongle(_board_rev: BoardRev) -> Result<Arc<dyn Dongle>, CliError> {
    Err(CliError::UsbFeatureDisabled)
}

fn dispatch(session: &Session, command: &Command) -> Result<(), CliError> {
    match command {
        Command::Home => {
            session.home();
            info!("homed");
            Ok(())
        }
        Command::Status => {
            let pos = session.position_get();
            info!(
                homed = session.is_homed(),
                estop = session.is_estop(),
                x = pos.x,
                y = pos.y,
                z = pos.z,
                "status"
            );
            Ok(())
        }
        Command::Estop => {
            session.estop();
            info!("estop raised");
            Ok(())
        }
        Command::EstopReset => {
            session.estop_reset()?;
            info!("estop cleared");
            Ok(())
        }
        Command::Mdi { x, y, z, vel, accel } => {
            let cmd = InterpreterCommand {
                line: 1,
                kind: CommandKind::LinearMove {
                    end: Pose {
                        x: *x,
                        y: *y,
                        z: *z,
                        ..Pose::default()
                    },
                    vel: *vel,
                    accel: *accel,
                },
            };
            let outcome = session.mdi_cmd(&cmd)?;
            session.io_done_wait();
            info!(?outcome, pos = ?session.position_get(), "mdi complete");
            Ok(())
        }
        Command::Auto { program: path, verify } => {
            let text = fs::read_to_string(path).map_err(|e| CliError::Io {
                path: path.display().to_string(),
                source: e,
            })?;
            let commands = program::parse(&text)?;
            let outcome = if *verify {
                session.verify_cmd(&commands)?
            } else {
                session.auto_cmd(&commands)?
            };
            if !*verify {
                session.io_done_wait();
            }
            info!(?outcome, pos = ?session.position_get(), "auto complete");
            Ok(())
        }
    }
}

fn setup_tracing(args: &Args) {
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::from_default_env().add_directive(level.into());
    if args.json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
