mod cli;

use std::fs;
use std::io;
use std::path::Path;
use std::process;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use clap_complete::{generate, shells::Bash};
use itertools::Itertools;
use log::{error, warn};

use scribbler::{AngleUnit, DriverConfig, Field, MoveMode, Reading, ScribblerDriver, Setting};

use cli::{Cli, Commands};

enum OutputFormat {
    Plain,
    Json,
}

fn reading_to_json(reading: &Reading) -> json::JsonValue {
    match reading {
        Reading::Bytes(v) => v.clone().into(),
        Reading::Words(v) => v.clone().into(),
        Reading::Ints(v) => v.clone().into(),
        Reading::Text(s) => s.as_str().into(),
        Reading::Volts(v) => (*v).into(),
    }
}

fn seconds(value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value).with_context(|| format!("Invalid duration {}", value))
}

fn cmd_info(driver: &ScribblerDriver, fmt: OutputFormat) -> Result<String> {
    let info = driver.get_info().context("Failed to query identification")?;
    let resolution = driver.resolution();

    Ok(match fmt {
        OutputFormat::Plain => info
            .fields()
            .iter()
            .map(|(key, value)| format!("{}: {}", key, value))
            .chain(std::iter::once(format!(
                "camera: {}x{}",
                resolution.width, resolution.height
            )))
            .join("\n"),
        OutputFormat::Json => {
            let mut object = json::JsonValue::new_object();
            for (key, value) in info.fields() {
                object[key.as_str()] = value.as_str().into();
            }
            object["width"] = resolution.width.into();
            object["height"] = resolution.height.into();
            object.dump()
        }
    })
}

fn cmd_get(driver: &ScribblerDriver, spec: &[String], fmt: OutputFormat) -> Result<String> {
    let spec = spec.join(" ");
    let field: Field = spec.parse()?;
    let reading = driver
        .get(field)
        .with_context(|| format!("Failed to read {}", spec))?;

    Ok(match fmt {
        OutputFormat::Plain => reading.to_string(),
        OutputFormat::Json => reading_to_json(&reading).dump(),
    })
}

fn cmd_set(driver: &ScribblerDriver, spec: &[String]) -> Result<String> {
    let spec = spec.join(" ");
    let setting: Setting = spec.parse()?;
    driver
        .set(&setting)
        .with_context(|| format!("Failed to set {}", spec))?;
    Ok(String::new())
}

fn cmd_move(
    driver: &ScribblerDriver,
    translate: f64,
    rotate: f64,
    duration: Option<f64>,
) -> Result<String> {
    driver
        .move_robot(translate, rotate)
        .context("Failed to start motors")?;

    if let Some(duration) = duration {
        thread::sleep(seconds(duration)?);
        driver.stop().context("Failed to stop motors")?;
    }
    Ok(String::new())
}

fn cmd_beep(
    driver: &ScribblerDriver,
    duration: f64,
    frequency: u16,
    frequency2: Option<u16>,
) -> Result<String> {
    driver
        .beep(seconds(duration)?, frequency, frequency2)
        .context("Failed to beep")?;
    Ok(String::new())
}

fn cmd_picture(driver: &ScribblerDriver, output: &Path, fmt: OutputFormat) -> Result<String> {
    let image = driver.take_picture().context("Failed to capture image")?;
    fs::write(output, image.to_pgm())
        .with_context(|| format!("Failed to write {}", output.display()))?;

    Ok(match fmt {
        OutputFormat::Plain => format!(
            "{}x{} -> {}",
            image.width(),
            image.height(),
            output.display()
        ),
        OutputFormat::Json => {
            let mut object = json::JsonValue::new_object();
            object["width"] = image.width().into();
            object["height"] = image.height().into();
            object["path"] = output.display().to_string().into();
            object.dump()
        }
    })
}

fn cmd_turn(driver: &ScribblerDriver, angle: f64, to: bool, radians: bool) -> Result<String> {
    let mode = if to { MoveMode::To } else { MoveMode::By };
    let unit = if radians {
        AngleUnit::Radians
    } else {
        AngleUnit::Degrees
    };

    driver
        .turn(angle, mode, unit)
        .with_context(|| format!("Failed to turn {}", angle))?;
    Ok(String::new())
}

fn do_main() -> Result<String> {
    if std::env::var("GENERATE_COMPLETION").is_ok() {
        generate(Bash, &mut Cli::command(), "scribbler-tool", &mut io::stdout());

        return Ok(String::default());
    }

    let cli = Cli::parse();
    let silenced = std::env::var("SCRIBBLER_SILENCE").map_or(false, |v| v == "1");
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(
        if silenced {
            "off"
        } else if cli.debug {
            "debug"
        } else {
            "info"
        },
    ))
    .format_timestamp(None)
    .format_target(false)
    .init();

    let fmt = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Plain
    };

    let config = DriverConfig::default()
        .with_baudrate(cli.baudrate)
        .with_force(cli.force)
        .with_retries(cli.retries);
    let driver = ScribblerDriver::open(&cli.port, config)
        .with_context(|| format!("Failed to connect to {}", cli.port))?;

    let estop = driver.emergency_stop_handle();
    ctrlc::set_handler(move || {
        warn!("interrupted, stopping motors");
        estop.trigger();
        process::exit(130);
    })
    .context("Failed to install Ctrl-C handler")?;

    match cli.command {
        Commands::Info => cmd_info(&driver, fmt),
        Commands::Get { field } => cmd_get(&driver, &field, fmt),
        Commands::Set { setting } => cmd_set(&driver, &setting),
        Commands::Move {
            translate,
            rotate,
            seconds,
        } => cmd_move(&driver, translate, rotate, seconds),
        Commands::Motors {
            left,
            right,
            seconds,
        } => {
            let (translate, rotate) = scribbler::motion::motors(left, right);
            cmd_move(&driver, translate, rotate, seconds)
        }
        Commands::Stop => driver
            .stop()
            .context("Failed to stop motors")
            .map(|_| String::new()),
        Commands::Beep {
            seconds,
            frequency,
            frequency2,
        } => cmd_beep(&driver, seconds, frequency, frequency2),
        Commands::Picture { output } => cmd_picture(&driver, &output, fmt),
        Commands::Turn { angle, to, radians } => cmd_turn(&driver, angle, to, radians),
    }
}

fn main() {
    match do_main() {
        Ok(s) if s.is_empty() => {}
        Ok(s) => println!("{}", s),
        Err(e) => {
            error!("{:#}", e);
            process::exit(1);
        }
    }
}
