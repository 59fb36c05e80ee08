//! Command-line interface for astro-live.
//!
//! Uses lexopt for minimal binary size overhead (~34KB).

use std::ffi::OsString;
use std::path::PathBuf;
use std::str::FromStr;

use lexopt::prelude::*;

/// Subcommand to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Fetch and store the charts for a birth profile.
    Fetch,
    /// Print a stored reading.
    Show,
    /// List stored profiles and readings.
    Users,
    /// Start a live voice consultation.
    Talk,
}

impl FromStr for Command {
    type Err = ArgsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fetch" => Ok(Self::Fetch),
            "show" => Ok(Self::Show),
            "users" => Ok(Self::Users),
            "talk" => Ok(Self::Talk),
            other => Err(ArgsError::UnexpectedArgument(other.to_string())),
        }
    }
}

/// Command-line arguments.
#[derive(Debug, Clone, Default)]
pub struct Args {
    /// Subcommand.
    pub command: Option<Command>,
    /// Path to configuration file.
    pub config: Option<PathBuf>,
    /// Path to the store file (overrides config file).
    pub store: Option<PathBuf>,
    /// Name on the birth profile.
    pub name: Option<String>,
    /// Birth date, `DD/MM/YYYY`.
    pub date: Option<String>,
    /// Birth time as (hours, minutes, seconds).
    pub time: Option<(u32, u32, u32)>,
    /// Birth place.
    pub place: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Timezone offset in hours.
    pub timezone: Option<f64>,
    /// Stored reading to talk about or show.
    pub user: Option<String>,
    /// Spoken language.
    pub language: Option<String>,
    /// Voice name.
    pub voice: Option<String>,
    /// Log level (error, warn, info, debug, trace).
    pub log_level: Option<String>,
    /// Platform API level used to pick the audio focus strategy.
    pub api_level: Option<u32>,
    /// Show version and exit.
    pub version: bool,
    /// Show help and exit.
    pub help: bool,
}

/// Parse command-line arguments.
pub fn parse_args() -> Result<Args, ArgsError> {
    parse_args_from(std::env::args_os())
}

/// Parse arguments from an iterator (for testing).
pub fn parse_args_from<I>(args: I) -> Result<Args, ArgsError>
where
    I: IntoIterator<Item = OsString>,
{
    let mut result = Args::default();
    let mut parser = lexopt::Parser::from_iter(args);

    while let Some(arg) = parser.next()? {
        match arg {
            Short('h') | Long("help") => {
                result.help = true;
            }
            Short('V') | Long("version") => {
                result.version = true;
            }
            Short('c') | Long("config") => {
                result.config = Some(parser.value()?.parse()?);
            }
            Long("store") => {
                result.store = Some(parser.value()?.parse()?);
            }
            Short('n') | Long("name") => {
                result.name = Some(parser.value()?.parse()?);
            }
            Short('d') | Long("date") => {
                result.date = Some(parser.value()?.parse()?);
            }
            Short('t') | Long("time") => {
                let value: String = parser.value()?.parse()?;
                result.time = Some(parse_time(&value)?);
            }
            Long("place") => {
                result.place = Some(parser.value()?.parse()?);
            }
            Long("lat") => {
                result.latitude = Some(parse_number(&mut parser, "lat")?);
            }
            Long("lon") => {
                result.longitude = Some(parse_number(&mut parser, "lon")?);
            }
            Long("timezone") => {
                result.timezone = Some(parse_number(&mut parser, "timezone")?);
            }
            Short('u') | Long("user") => {
                result.user = Some(parser.value()?.parse()?);
            }
            Long("language") => {
                result.language = Some(parser.value()?.parse()?);
            }
            Long("voice") => {
                result.voice = Some(parser.value()?.parse()?);
            }
            Short('l') | Long("log-level") => {
                result.log_level = Some(parser.value()?.parse()?);
            }
            Long("api-level") => {
                result.api_level = Some(parse_number(&mut parser, "api-level")?);
            }
            Value(val) if result.command.is_none() => {
                result.command = Some(val.to_string_lossy().parse()?);
            }
            Value(val) => {
                return Err(ArgsError::UnexpectedArgument(val.to_string_lossy().into()));
            }
            _ => return Err(arg.unexpected().into()),
        }
    }

    Ok(result)
}

fn parse_number<T: FromStr>(
    parser: &mut lexopt::Parser,
    name: &'static str,
) -> Result<T, ArgsError> {
    let value: String = parser.value()?.parse()?;
    value
        .parse()
        .map_err(|_| ArgsError::InvalidValue(name, value))
}

/// Parse `HH:MM` or `HH:MM:SS`.
fn parse_time(value: &str) -> Result<(u32, u32, u32), ArgsError> {
    let invalid = || ArgsError::InvalidValue("time", value.to_string());

    let parts = value
        .split(':')
        .map(|p| p.parse::<u32>().map_err(|_| invalid()))
        .collect::<Result<Vec<_>, _>>()?;

    let (hours, minutes, seconds) = match parts.as_slice() {
        [h, m] => (*h, *m, 0),
        [h, m, s] => (*h, *m, *s),
        _ => return Err(invalid()),
    };
    if hours > 23 || minutes > 59 || seconds > 59 {
        return Err(invalid());
    }
    Ok((hours, minutes, seconds))
}

/// Print help message.
pub fn print_help() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        r#"astro-live {version}
Birth-chart voice consultations over a reconnecting live model session

USAGE:
    astro-live <COMMAND> [OPTIONS]

COMMANDS:
    fetch                   Fetch and store the charts for a birth profile
    show                    Print the stored reading for --user
    users                   List stored profiles and readings
    talk                    Start a live voice consultation for --user

OPTIONS:
    -c, --config <FILE>     Path to configuration file (JSON)
        --store <FILE>      Path to the store file [default: astro-live.json]
    -n, --name <NAME>       Name on the birth profile (fetch)
    -d, --date <DATE>       Birth date as DD/MM/YYYY (fetch)
    -t, --time <TIME>       Birth time as HH:MM[:SS] (fetch)
        --place <PLACE>     Birth place (fetch)
        --lat <DEG>         Birth latitude (fetch)
        --lon <DEG>         Birth longitude (fetch)
        --timezone <HOURS>  Timezone offset in hours [default: 5.75]
    -u, --user <NAME>       Stored reading to use (show, talk)
        --language <LANG>   Spoken language [default: Nepali]
        --voice <VOICE>     Voice name [default: Zephyr]
        --api-level <N>     Platform API level for audio focus [default: 31]
    -l, --log-level <LVL>   Log level (error, warn, info, debug, trace)
    -h, --help              Print help
    -V, --version           Print version

ENVIRONMENT VARIABLES:
    ASTRO_LIVE_API_KEY      Astrology API key (overrides config)
    ASTRO_LIVE_GEMINI_KEY   Live model API key (overrides config)
    ASTRO_LIVE_LANGUAGE     Spoken language (overrides config)
    ASTRO_LIVE_VOICE        Voice name (overrides config)
    ASTRO_LIVE_STORE        Store file (overrides config)
    ASTRO_LIVE_LOG_LEVEL    Log level (overrides config)
    RUST_LOG                Alternative log level setting

EXAMPLES:
    # Fetch and store a chart
    astro-live fetch -n Asha -d 15/08/1990 -t 06:05 --place Kathmandu \
        --lat 27.7172 --lon 85.324

    # Talk about it; microphone PCM on stdin, model audio on stdout
    arecord -f S16_LE -r 16000 -c 1 -t raw | astro-live talk -u Asha | \
        aplay -f S16_LE -r 24000 -c 1 -t raw
"#
    );
}

/// Print version.
pub fn print_version() {
    println!("astro-live {}", env!("CARGO_PKG_VERSION"));
}

/// Argument parsing errors.
#[derive(Debug)]
pub enum ArgsError {
    /// Lexopt parsing error.
    Lexopt(lexopt::Error),
    /// Invalid argument value.
    InvalidValue(&'static str, String),
    /// Unexpected positional argument.
    UnexpectedArgument(String),
    /// A required option is absent.
    Missing(&'static str),
}

impl std::fmt::Display for ArgsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lexopt(e) => write!(f, "{}", e),
            Self::InvalidValue(name, value) => {
                write!(f, "invalid value for --{}: '{}'", name, value)
            }
            Self::UnexpectedArgument(arg) => {
                write!(f, "unexpected argument: '{}'", arg)
            }
            Self::Missing(name) => write!(f, "missing required option --{}", name),
        }
    }
}

impl std::error::Error for ArgsError {}

impl From<lexopt::Error> for ArgsError {
    fn from(e: lexopt::Error) -> Self {
        Self::Lexopt(e)
    }
}
