use amqp_demo_agent::client::{AmqpSession, ConnectionParams, DEFAULT_CREDENTIAL, DEFAULT_VHOST};
use amqp_demo_agent::publisher::run_batch;
use amqp_demo_agent::util::init_logger;
use amqp_demo_agent::Result;
#[macro_use]
extern crate clap;
use clap::{App, Arg};
use log::info;
use std::io;
use std::process;

static HOST_ARG: &str = "HOST";
static PORT_ARG: &str = "PORT";
static RATE_LIMIT_ARG: &str = "RATE_LIMIT";
static MESSAGE_COUNT_ARG: &str = "MESSAGE_COUNT";
static QUEUE_ARG: &str = "queue";
static VHOST_ARG: &str = "vhost";
static USERNAME_ARG: &str = "username";
static PASSWORD_ARG: &str = "password";

const DEFAULT_QUEUE: &str = "test queue";

#[derive(Debug)]
struct Args {
    connection: ConnectionParams,
    queue: String,
    rate_limit: u32,
    message_count: u64,
}

fn positive(value: String) -> std::result::Result<(), String> {
    match value.parse::<u32>() {
        Ok(0) => Err(String::from("must be greater than zero")),
        Ok(_) => Ok(()),
        Err(e) => Err(e.to_string()),
    }
}

fn parse_args() -> Args {
    let matches = App::new("producer")
        .version(crate_version!())
        .about("Publishes a paced batch of messages and reports the throughput")
        .arg(Arg::with_name(HOST_ARG).required(true).index(1).help("broker host"))
        .arg(Arg::with_name(PORT_ARG).required(true).index(2).help("broker port"))
        .arg(Arg::with_name(RATE_LIMIT_ARG)
                 .required(true)
                 .index(3)
                 .validator(positive)
                 .help("maximum average messages per second"))
        .arg(Arg::with_name(MESSAGE_COUNT_ARG)
                 .required(true)
                 .index(4)
                 .help("number of messages to send"))
        .arg(Arg::with_name(QUEUE_ARG)
                 .long(QUEUE_ARG)
                 .takes_value(true)
                 .default_value(DEFAULT_QUEUE)
                 .help("queue to publish to through the default exchange"))
        .arg(Arg::with_name(VHOST_ARG)
                 .long(VHOST_ARG)
                 .takes_value(true)
                 .default_value(DEFAULT_VHOST))
        .arg(Arg::with_name(USERNAME_ARG)
                 .long(USERNAME_ARG)
                 .takes_value(true)
                 .default_value(DEFAULT_CREDENTIAL))
        .arg(Arg::with_name(PASSWORD_ARG)
                 .long(PASSWORD_ARG)
                 .takes_value(true)
                 .default_value(DEFAULT_CREDENTIAL))
        .get_matches();

    let port = value_t_or_exit!(matches, PORT_ARG, u16);
    let rate_limit = value_t_or_exit!(matches, RATE_LIMIT_ARG, u32);
    let message_count = value_t_or_exit!(matches, MESSAGE_COUNT_ARG, u64);
    let value = |name: &str| matches.value_of(name).unwrap_or_default().to_string();

    Args {
        connection: ConnectionParams {
            vhost: value(VHOST_ARG),
            username: value(USERNAME_ARG),
            password: value(PASSWORD_ARG),
            ..ConnectionParams::new(value(HOST_ARG), port)
        },
        queue: value(QUEUE_ARG),
        rate_limit,
        message_count,
    }
}

fn run(args: &Args) -> Result<()> {
    let session = AmqpSession::open(&args.connection)?;
    info!("Connected, sending to '{}'", args.queue);

    let stdout = io::stdout();
    run_batch(
        &mut session.publisher(),
        &args.queue,
        args.rate_limit,
        args.message_count,
        &mut stdout.lock(),
    )?;

    session.close()
}

fn main() {
    init_logger("info");

    let args = parse_args();
    info!("{:?}", args);
    if let Err(e) = run(&args) {
        eprintln!("{}", e);
        process::exit(1);
    }
}
