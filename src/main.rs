use std::fmt;
use std::process::ExitCode;
use std::time::Duration;

use clap::{ArgAction, Parser};
use hivelog::config::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_BYTES_PER_SIDE};
use hivelog::search::{self, error_pattern};
use hivelog::suite::{self, TestLog, TestSuite};
use hivelog::window::split_head_tail;
use hivelog::{
    ByteRange, HttpRangeSource, LineWindow, LoaderConfig, LogLoader, MappedSource, RangeSource,
    Result,
};
use regex::Regex;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "hivelog")]
#[command(about = "Show the head and tail of large test logs")]
struct Args {
    /// Log file URL or path, or a suite file when --test is given
    target: String,

    /// Show the log of this test case of the suite file
    #[arg(long)]
    test: Option<String>,

    /// First byte of the log range
    #[arg(long)]
    begin: Option<u64>,

    /// End of the log range (exclusive), defaults to the file size
    #[arg(long)]
    end: Option<u64>,

    /// Lines to show from each end
    #[arg(short = 'n', long, default_value_t = 25)]
    lines: usize,

    /// Bytes to read from each end at most, 0 for no limit
    #[arg(long, default_value_t = DEFAULT_MAX_BYTES_PER_SIDE)]
    max_bytes: u64,

    /// Size of each range request
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: u64,

    /// Print the whole log
    #[arg(long, conflicts_with = "grep")]
    full: bool,

    /// Print lines matching this regex
    #[arg(long)]
    grep: Option<String>,

    /// Stop after this many matching lines
    #[arg(long, default_value_t = 100)]
    max_matches: usize,

    /// Fail on invalid UTF-8
    #[arg(long)]
    strict_utf8: bool,

    /// Drop a blank last line from the tail
    #[arg(long)]
    skip_trailing_empty_line: bool,

    /// Request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn loader_config(&self) -> LoaderConfig {
        LoaderConfig::default()
            .with_chunk_size(self.chunk_size)
            .with_max_bytes_per_side(Some(self.max_bytes).filter(|&b| b > 0))
            .with_strict_utf8(self.strict_utf8)
            .with_skip_trailing_empty_line(self.skip_trailing_empty_line)
            .with_timeout(self.timeout.map(Duration::from_secs))
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("hivelog: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("hivelog: failed to install logger: {}", e);
    }
}

fn is_url(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

async fn run(args: &Args) -> Result<()> {
    let config = args.loader_config();

    let (location, range) = match &args.test {
        Some(id) => {
            let suite = load_suite(&args.target, config.timeout).await?;
            match suite::test_log(&suite, &args.target, id)? {
                TestLog::Inline(text) => {
                    debug!(test = %id, "log stored inline");
                    return show_inline(&text, args);
                }
                TestLog::Range { location, range } => (location, Some(range)),
            }
        }
        None => (args.target.clone(), None),
    };

    if is_url(&location) {
        let source = HttpRangeSource::new(location, config.timeout)?;
        show(open_loader(source, range, args, config).await?, args).await
    } else {
        let source = MappedSource::open(&location)?;
        show(open_loader(source, range, args, config).await?, args).await
    }
}

async fn load_suite(location: &str, timeout: Option<Duration>) -> Result<TestSuite> {
    if is_url(location) {
        let client = hivelog::http::build_client(timeout)?;
        hivelog::http::fetch_json(&client, location).await
    } else {
        TestSuite::from_json(&std::fs::read_to_string(location)?)
    }
}

async fn open_loader<S: RangeSource>(
    source: S,
    range: Option<ByteRange>,
    args: &Args,
    config: LoaderConfig,
) -> Result<LogLoader<S>> {
    let range = match range {
        Some(range) => range,
        None => {
            let end = match args.end {
                Some(end) => end,
                None => source.size().await?,
            };
            ByteRange::new(args.begin.unwrap_or(0), end)?
        }
    };
    Ok(LogLoader::new(source, range, config))
}

async fn show<S: RangeSource>(loader: LogLoader<S>, args: &Args) -> Result<()> {
    if args.full {
        let text = loader
            .text(|received, total| eprint!("\rloaded {}/{} bytes", received, total))
            .await?;
        eprintln!();
        print!("{}", text);
        return Ok(());
    }

    if let Some(pattern) = &args.grep {
        let pattern = Regex::new(pattern)?;
        for m in search::scan(&loader, &pattern, args.max_matches).await? {
            print_line(m.line_num, &m.text, true);
        }
        return Ok(());
    }

    let window = loader.head_and_tail(args.lines).await?;
    print_window(&window, &error_pattern()?);
    Ok(())
}

fn show_inline(text: &str, args: &Args) -> Result<()> {
    if args.full {
        print!("{}", text);
        return Ok(());
    }

    if let Some(pattern) = &args.grep {
        let pattern = Regex::new(pattern)?;
        let lines: Vec<(usize, String)> = text
            .split_inclusive('\n')
            .enumerate()
            .map(|(i, l)| (i + 1, l.to_string()))
            .collect();
        let mut matched: Vec<usize> = search::search_lines(&pattern, &lines)
            .into_iter()
            .map(|m| m.line_num)
            .collect();
        matched.dedup();
        for line_num in matched.into_iter().take(args.max_matches) {
            print_line(line_num, &lines[line_num - 1].1, true);
        }
        return Ok(());
    }

    print_window(&split_head_tail(text, args.lines), &error_pattern()?);
    Ok(())
}

fn print_window(window: &LineWindow, errors: &Regex) {
    for (i, line) in window.head.iter().enumerate() {
        print_line(i + 1, line, errors.is_match(line));
    }
    if window.is_truncated() {
        let about = if window.hidden_lines_exact { "" } else { "about " };
        println!("{:8} ...{}{} lines hidden...", "", about, window.hidden_lines);
    }
    let first = window.tail_first_line();
    for (i, line) in window.tail.iter().enumerate() {
        let line_num = first + i as u64;
        let marked = errors.is_match(line);
        if window.hidden_lines_exact {
            print_line(line_num, line, marked);
        } else {
            print_line(format!("~{}", line_num), line, marked);
        }
    }
}

fn print_line(line_num: impl fmt::Display, text: &str, marked: bool) {
    let marker = if marked { '!' } else { ' ' };
    println!("{:>8}{}│ {}", line_num, marker, text.trim_end_matches('\n'));
}
