use std::path::Path;

use anyhow::{Context, bail};
use clap::Parser;
use digitemp::{DbConfig, LogType, RcFile, Session, Settings, Sink, Topology};
use embedded_onewire::Network;

use args::Args;
use ds9097::Ds9097;

mod args;
mod ds9097;

fn main() -> anyhow::Result<()> {
    // Initialize the logger
    env_logger::init();
    let args = Args::parse();

    let (mut settings, topology) = match RcFile::load(&args.config)? {
        Some(rc) => (rc.settings, rc.topology),
        None => {
            log::info!("{} not found, starting without sensors", args.config.display());
            (Settings::default(), Topology::new())
        }
    };
    settings.apply(args.overrides()?);
    let db = DbConfig::load(&args.db_config)?;

    if settings.port.is_empty() {
        bail!(
            "no serial port given, pass -s or set TTY in {}",
            args.config.display()
        );
    }
    if !Path::new(&settings.port).exists() {
        bail!("serial port {} does not exist", settings.port);
    }
    let adapter = Ds9097::open(&settings.port)
        .with_context(|| format!("unable to open {}", settings.port))?;

    let mut sink = Sink::for_settings(&settings)?.with_database(db);
    if args.database {
        sink.set_log_type(LogType::Database);
    }
    let mut session = Session::new(
        Network::new(adapter),
        linux_embedded_hal::Delay,
        settings,
        sink,
    )
    .with_topology(topology)
    .with_ad_mode(args.ad_mode)
    .with_verbose(args.verbose)
    .with_quiet(args.quiet);

    let outcome = run(&mut session, &args);
    session.close();
    outcome
}

fn run(
    session: &mut Session<Network<Ds9097>, linux_embedded_hal::Delay>,
    args: &Args,
) -> anyhow::Result<()> {
    if args.walk {
        session.walk()?;
    }
    if args.init {
        session.init(&args.config)?;
        log::info!("found {} sensors", session.topology().len());
    }
    if args.reads() {
        if session.topology().is_empty() {
            log::warn!("no sensors configured, run with -i first");
        }
        session.run(args.sampling())?;
    }
    Ok(())
}
