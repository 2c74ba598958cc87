use clap::{Parser, Subcommand};
use std::path::PathBuf;

use scribbler::driver::parse_number;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    /// Skip sanity checks
    #[clap(long, short)]
    pub force: bool,

    /// enable debug output
    #[clap(long, short)]
    pub debug: bool,

    /// Serial device or 'auto'
    #[clap(long, short, default_value = "auto")]
    pub port: String,

    /// Serial baud rate
    #[clap(long, short, default_value_t = 38400)]
    pub baudrate: u32,

    /// Query retry count
    #[clap(long, short, default_value_t = 0)]
    pub retries: usize,

    /// Use json-formatted output
    #[clap(long, short)]
    pub json: bool,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the dongle identification
    Info,

    /// Read a sensor or setting, e.g. `get light left`
    Get {
        #[clap(required = true)]
        field: Vec<String>,
    },

    /// Change a setting, e.g. `set led all on`
    Set {
        #[clap(required = true)]
        setting: Vec<String>,
    },

    /// Drive with translate and rotate velocities in [-1, 1]
    #[clap(visible_alias = "drive")]
    Move {
        #[clap(allow_hyphen_values = true)]
        translate: f64,
        #[clap(allow_hyphen_values = true)]
        rotate: f64,
        /// Stop after this many seconds
        #[clap(long, short)]
        seconds: Option<f64>,
    },

    /// Drive with left and right wheel velocities in [-1, 1]
    Motors {
        #[clap(allow_hyphen_values = true)]
        left: f64,
        #[clap(allow_hyphen_values = true)]
        right: f64,
        /// Stop after this many seconds
        #[clap(long, short)]
        seconds: Option<f64>,
    },

    /// Stop both motors
    Stop,

    /// Play a tone
    Beep {
        /// Duration in seconds
        seconds: f64,
        #[clap(parse(try_from_str=parse_number))]
        frequency: u16,
        #[clap(parse(try_from_str=parse_number))]
        frequency2: Option<u16>,
    },

    /// Save a camera frame as binary PGM
    #[clap(visible_alias = "snap")]
    Picture {
        #[clap(parse(from_os_str))]
        output: PathBuf,
    },

    /// Turn by (or to) an angle in degrees
    Turn {
        #[clap(allow_hyphen_values = true)]
        angle: f64,
        /// Absolute heading instead of a relative turn
        #[clap(long)]
        to: bool,
        /// Angle is in radians
        #[clap(long)]
        radians: bool,
    },
}
