use anyhow::{bail, Context};
use mdnote::editor::{EditorSession, SessionOptions, SessionParts};
use mdnote::file::{wrap_html_document, FileReader, FileSaveSink};
use mdnote::notification::{self, NotificationCenter};
use mdnote::scheduler::{SystemClock, TurnQueue};
use mdnote::{error, logging, EngineConfig};
use std::path::PathBuf;
use std::rc::Rc;

const MAX_TURNS: usize = 64;

fn main() -> anyhow::Result<()> {
    error::setup_panic_handler();
    let args: Vec<String> = std::env::args().skip(1).collect();
    let options = parse_args(&args)?;

    let config = match &options.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("cannot load config {}", path.display()))?,
        None => match EngineConfig::default_path() {
            Some(path) => EngineConfig::load_or_default(&path)?,
            None => EngineConfig::default(),
        },
    };
    logging::init(config.log_level, config.log_file_path()?)?;

    let clock = Rc::new(SystemClock::new());
    let center = NotificationCenter::new(clock.clone(), config.notification_default_duration());
    notification::install_global(center.clone());

    let queue = TurnQueue::new();
    let parts = SessionParts::new(Rc::new(queue.clone()), clock.clone(), center.clone());
    let mut session = EditorSession::new(parts, SessionOptions::from_config(&config));

    let note = FileReader::new()
        .read_note(&options.input)
        .with_context(|| format!("cannot read {}", options.input.display()))?;
    session.load_note(note);
    queue.run_until_idle(MAX_TURNS);
    if session.preview_state().rendered_view.is_none() {
        session.refresh_preview();
    }

    if let Some(output) = &options.save {
        let mut sink = FileSaveSink::to_path(output.clone());
        session.save_note(&mut sink)?;
        queue.run_until_idle(MAX_TURNS);
    }
    clock.poll();

    let preview = session.preview_view();
    print!("{}", wrap_html_document(&session.title(), &preview.html));

    eprintln!("{}", session.word_count_view().text());
    eprintln!("{}", session.save_status_view().text);
    for item in session.notification_view().items {
        eprintln!("[{}] {}: {}", item.kind.label(), item.title, item.message);
    }

    notification::teardown_global();
    Ok(())
}

struct CliOptions {
    input: PathBuf,
    config: Option<PathBuf>,
    save: Option<PathBuf>,
}

fn parse_args(args: &[String]) -> anyhow::Result<CliOptions> {
    let mut input: Option<PathBuf> = None;
    let mut config: Option<PathBuf> = None;
    let mut save: Option<PathBuf> = None;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => match iter.next() {
                Some(path) => config = Some(PathBuf::from(path)),
                None => bail!("--config requires a path"),
            },
            "--save" => match iter.next() {
                Some(path) => save = Some(PathBuf::from(path)),
                None => bail!("--save requires a path"),
            },
            "--version" => {
                println!("mdnote {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "-h" | "--help" => {
                print_usage();
                std::process::exit(0);
            }
            other if other.starts_with('-') => bail!("unknown option: {}", other),
            other => input = Some(PathBuf::from(other)),
        }
    }

    match input {
        Some(input) => Ok(CliOptions {
            input,
            config,
            save,
        }),
        None => {
            print_usage();
            bail!("missing input file")
        }
    }
}

fn print_usage() {
    eprintln!("usage: mdnote [--config PATH] [--save OUT] FILE.md");
}
