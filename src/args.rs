use std::env;
use std::path::PathBuf;

pub const DEFAULT_TEMPLATE_DIR: &str = "templates";

#[derive(Debug, Clone)]
pub enum Mode {
    /// Build templates from reference images in a directory
    Calibrate { references: PathBuf },
    /// Scan a directory of frames and print every state change
    Scan { frames: PathBuf, loop_playback: bool },
    /// List stored templates
    Inspect,
}

#[derive(Debug)]
pub struct Args {
    pub mode: Mode,
    pub labels: Option<Vec<String>>,
    pub templates: PathBuf,
    pub config: Option<PathBuf>,
    pub debug_mode: bool,
}

impl Args {
    pub fn parse() -> Option<Self> {
        let args: Vec<String> = env::args().collect();
        Self::parse_from(args.iter().skip(1).map(String::as_str))
    }

    pub fn parse_from<'a>(args: impl IntoIterator<Item = &'a str>) -> Option<Self> {
        let mut mode: Option<Mode> = None;
        let mut labels: Option<Vec<String>> = None;
        let mut templates = PathBuf::from(DEFAULT_TEMPLATE_DIR);
        let mut config: Option<PathBuf> = None;
        let mut debug_mode = false;
        let mut loop_playback = false;

        for arg in args {
            if arg == "--help" || arg == "-h" {
                print_help();
                return None;
            } else if arg == "--version" || arg == "-v" {
                println!(
                    "Hand Recognizer v{} (c) {}",
                    env!("RECOGNIZER_VERSION_DISPLAY"),
                    env!("RECOGNIZER_BUILD_YEAR")
                );
                return None;
            } else if arg == "--debug" {
                debug_mode = true;
            } else if arg == "--loop" {
                loop_playback = true;
            } else if arg == "--inspect" {
                mode = Some(Mode::Inspect);
            } else if let Some(dir) = arg.strip_prefix("--calibrate=") {
                mode = Some(Mode::Calibrate {
                    references: PathBuf::from(dir),
                });
            } else if let Some(dir) = arg.strip_prefix("--scan=") {
                mode = Some(Mode::Scan {
                    frames: PathBuf::from(dir),
                    loop_playback: false,
                });
            } else if let Some(dir) = arg.strip_prefix("--templates=") {
                templates = PathBuf::from(dir);
            } else if let Some(path) = arg.strip_prefix("--config=") {
                config = Some(PathBuf::from(path));
            } else if let Some(list) = arg.strip_prefix("--labels=") {
                labels = Some(list.split(',').map(|l| l.trim().to_string()).collect());
            } else {
                eprintln!("❌ Unknown argument: {}", arg);
                print_help();
                return None;
            }
        }

        let mode = match mode {
            Some(Mode::Scan { frames, .. }) => Mode::Scan {
                frames,
                loop_playback,
            },
            Some(mode) => mode,
            None => {
                eprintln!("❌ No mode given: use --calibrate, --scan or --inspect");
                print_help();
                return None;
            }
        };

        if matches!(mode, Mode::Calibrate { .. }) && labels.is_none() {
            eprintln!("❌ --calibrate requires --labels=a,b,...");
            return None;
        }

        Some(Args {
            mode,
            labels,
            templates,
            config,
            debug_mode,
        })
    }
}

fn print_help() {
    println!("🃏 Hand Recognizer");
    println!();
    println!("USAGE:");
    println!("    hand-recognizer <MODE> [FLAGS]");
    println!();
    println!("MODES:");
    println!("    --calibrate=<dir>     Build templates from reference images (<label>.png ...)");
    println!("    --scan=<dir>          Recognize a directory of frames, printing state changes");
    println!("    --inspect             List stored templates");
    println!();
    println!("FLAGS:");
    println!("    --labels=a,b,...      The eight label names (required for --calibrate;");
    println!("                          --scan reads them from the templates if omitted)");
    println!("    --templates=<dir>     Template directory (default: {})", DEFAULT_TEMPLATE_DIR);
    println!("    --config=<file>       Recognizer configuration (TOML)");
    println!("    --loop                Replay the frame directory until interrupted");
    println!("    --debug               Enable debug logging");
    println!("    --help, -h            Show this help message");
    println!("    --version, -v         Show version information");
    println!();
    println!("EXAMPLES:");
    println!("    hand-recognizer --calibrate=refs --labels=Archer,Bomber,... --templates=tpl");
    println!("    hand-recognizer --scan=frames --templates=tpl --debug");
    println!("    hand-recognizer --inspect --templates=tpl");
}
