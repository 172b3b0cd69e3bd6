use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
pub use clap_complete::Shell;

const LONG_ABOUT: &str = r#"viewserver inspects the live view hierarchy of Android windows through the
on-device view server, reached over an adb port forward.

WORKFLOW:
    1. Check attached devices (devices)
    2. Make sure the view server runs (server start)
    3. List windows and pick one (windows)
    4. Dump or profile its hierarchy (dump, profile)
    5. Watch for window and focus changes (watch)

WINDOWS AND NODES:
    Windows are addressed by the hex hash code shown by 'windows'; 'focused'
    addresses whatever window has focus. Nodes are addressed by the hex hash
    code after the '@' in 'dump' output.

EXAMPLES:
    viewserver devices
    viewserver -s emulator-5554 windows
    viewserver dump 41a2b3c --profile
    viewserver dump focused --filter button
    viewserver invalidate 41a2b3c b00d1e
    viewserver watch --json"#;

#[derive(Parser)]
#[command(name = "viewserver")]
#[command(author, version)]
#[command(about = "Inspect live Android view hierarchies through the view server")]
#[command(long_about = LONG_ABOUT)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Device serial (default: the only attached device)
    #[arg(short, long, global = true, env = "ANDROID_SERIAL")]
    pub serial: Option<String>,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Output as JSON (shorthand for --format json)
    #[arg(long, global = true)]
    pub json: bool,

    /// Disable colored output (also respects NO_COLOR env var)
    #[arg(
        long,
        global = true,
        env = "NO_COLOR",
        value_parser = clap::builder::FalseyValueParser::new()
    )]
    pub no_color: bool,

    /// Log protocol traffic to stderr (or VIEWSERVER_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the adb executable
    #[arg(long, global = true, env = "ADB", default_value = "adb")]
    pub adb: PathBuf,
}

impl Cli {
    /// Returns the effective output format, considering --json shorthand.
    pub fn effective_format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            self.format
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List attached devices
    Devices,

    /// Control the on-device view server
    #[command(subcommand)]
    Server(ServerCommand),

    /// List the device's windows, top of the stack first
    Windows,

    /// Show the focused window's hash code
    Focus,

    /// Dump a window's view hierarchy
    #[command(long_about = r#"Dump a window's view hierarchy.

Prints one line per view, indented by depth, with the view's id, bounds and
subtree size. --profile adds measure/layout/draw times and rates each view
against its siblings (red >= 80%, yellow >= 50% of the siblings' total).

EXAMPLES:
    viewserver dump 41a2b3c
    viewserver dump focused --profile
    viewserver dump 41a2b3c --filter textview --json"#)]
    Dump {
        /// Window hash code (hex) or 'focused'
        window: String,

        /// Also load profiling data
        #[arg(short, long)]
        profile: bool,

        /// Mark views whose class name or id contains TEXT
        #[arg(long, value_name = "TEXT")]
        filter: Option<String>,
    },

    /// Profile a window and print only timings and ratings
    Profile {
        /// Window hash code (hex) or 'focused'
        window: String,
    },

    /// Ask a view to redraw
    Invalidate {
        /// Window hash code (hex) or 'focused'
        window: String,

        /// Node hash code (hex), as shown after '@' in dump output
        node: String,
    },

    /// Ask a view to lay itself out again
    Relayout {
        /// Window hash code (hex) or 'focused'
        window: String,

        /// Node hash code (hex), as shown after '@' in dump output
        node: String,
    },

    /// Stream window and focus change events until interrupted
    Watch,

    /// Generate shell completion scripts
    #[command(long_about = r#"Generate shell completion scripts.

EXAMPLES:
    viewserver completions bash > /etc/bash_completion.d/viewserver
    viewserver completions zsh > "${fpath[1]}/_viewserver""#)]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Subcommand)]
pub enum ServerCommand {
    /// Report whether the view server is running
    Status,

    /// Start the view server
    Start {
        /// Port the server listens on inside the device
        #[arg(long, default_value_t = viewserver_ipc::DEFAULT_SERVER_PORT)]
        port: u16,
    },

    /// Stop the view server
    Stop,
}

#[derive(Debug, Clone, Copy, Default, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}
