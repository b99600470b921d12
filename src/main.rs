use std::hint::black_box;
use std::sync::Arc;

use anyhow::{Context, Result};
use calltrace::catalog::{NamedCatalog, OperationCatalog, OperationId};
use calltrace::cli::{Cli, OutputFormat};
use calltrace::clock::MonotonicClock;
use calltrace::context::TraceSlot;
use calltrace::error::ObserverError;
use calltrace::host::ProcessHost;
use calltrace::observer::{CallArgs, HookRef};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into())
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn printing_hook(label: &'static str) -> HookRef {
    Arc::new(move |args: &CallArgs| -> Result<(), ObserverError> {
        println!("{} {}", label, args.name());
        Ok(())
    })
}

/// Stand-in for the wrapped operation
fn busy_work(seed: u64, steps: u32) -> u64 {
    let mut acc = seed;
    for i in 0..steps {
        acc = acc.wrapping_mul(6364136223846793005).wrapping_add(u64::from(i));
    }
    acc
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.debug);

    let catalog = NamedCatalog::from_list(&args.ops)?;
    let host = ProcessHost::new();
    let mut slot = TraceSlot::new();

    let ctx = match slot.initialize(&host, &catalog) {
        Ok(ctx) => ctx,
        Err(e) => {
            let reported = host.take_error().unwrap_or(e);
            anyhow::bail!("Failed to initialize trace context: {}", reported);
        }
    };

    if args.print_calls {
        ctx.set_trace_functions(Some(printing_hook("enter")), Some(printing_hook("exit")));
    }

    let clock = MonotonicClock::new();
    let mut checksum = 0u64;
    for i in 0..args.iterations {
        for id in 0..catalog.len() as u32 {
            let op = OperationId(id);
            let out = ctx.instrument(op, &clock, || busy_work(i ^ u64::from(id), args.work));
            checksum = checksum.wrapping_add(black_box(out));
        }
    }
    tracing::debug!(checksum, "workload finished");

    let summary = slot
        .shutdown()
        .context("trace context disappeared before shutdown")?;

    match args.format {
        OutputFormat::Text => summary.print_summary(),
        OutputFormat::Json => println!("{}", summary.to_json()?),
    }

    Ok(())
}
