use amqp_demo_agent::client::AmqpSession;
use amqp_demo_agent::config::AgentConfig;
use amqp_demo_agent::consumer::run_consume_loop;
use amqp_demo_agent::util::init_logger;
use amqp_demo_agent::{Error, Result};
#[macro_use]
extern crate clap;
use clap::{App, Arg};
use log::{error, info};
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::process;

static CFG_FILE_ARG: &str = "CFG_FILE";
static LOG_FILE_ARG: &str = "LOG_FILE";

struct Args {
    cfg_file: PathBuf,
    log_file: PathBuf,
}

fn parse_args() -> Args {
    let matches = App::new("agent")
        .version(crate_version!())
        .about("Answers every task on the input queue with a success reply")
        .arg(Arg::with_name(CFG_FILE_ARG)
                 .required(true)
                 .index(1)
                 .help("configuration file with the RABBITMQ_* keys"))
        .arg(Arg::with_name(LOG_FILE_ARG)
                 .required(true)
                 .index(2)
                 .help("file every received message is appended to"))
        .get_matches();

    // both are required, clap has already exited if either is missing
    Args {
        cfg_file: PathBuf::from(matches.value_of_os(CFG_FILE_ARG).unwrap_or_default()),
        log_file: PathBuf::from(matches.value_of_os(LOG_FILE_ARG).unwrap_or_default()),
    }
}

/// append-only, created with rw for user and group if missing
fn open_log_file(path: &Path) -> Result<File> {
    let mut options = OpenOptions::new();
    options.create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o660);
    }
    options
        .open(path)
        .map_err(Error::io(format!("Failed to open the log file '{}'", path.display())))
}

fn run(args: &Args) -> Result<()> {
    let mut log_file = open_log_file(&args.log_file)?;
    let config = AgentConfig::load(&args.cfg_file)?;

    println!("Starting agent with the following configuration:\n");
    println!("{}", config);

    let session = AmqpSession::open(&config.connection())?;
    let mut consumer = session.consumer(&config.rabbitmq_input_queue)?;
    println!("\nSuccessfully connected to RabbitMQ server! Ready for messages...");

    let stdout = io::stdout();
    let exit = run_consume_loop(
        &mut consumer,
        &config.reply_target(),
        &mut stdout.lock(),
        &mut log_file,
    )?;
    info!("Stopped after {} messages: {}", exit.received, exit.outcome);

    drop(consumer);
    session.close()
}

fn main() {
    init_logger("info");

    let args = parse_args();
    if let Err(e) = run(&args) {
        error!("agent stopped with an error");
        eprintln!("{}", e);
        process::exit(1);
    }
}
