//! p8x-emu: Spin bytecode emulator for the Parallax P8X32A

use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use p8x_emu::config::Config;
use p8x_emu::{Machine, RunState, SpinImage};

fn main() -> ExitCode {
    env_logger::init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let config = Config::get();

    let mut path: Option<String> = None;
    let mut ticks: Option<u64> = None;
    let mut breakpoint: Option<u32> = None;

    let mut iter = args[1..].iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--ticks" | "-t" => {
                let value = iter.next().context("--ticks needs a value")?;
                ticks = Some(parse_number(value).context("bad --ticks value")?);
            }
            "--breakpoint" | "-b" => {
                let value = iter.next().context("--breakpoint needs a value")?;
                breakpoint = Some(parse_number(value).context("bad --breakpoint value")? as u32);
            }
            "--help" | "-h" => {
                print_usage();
                return Ok(());
            }
            other if !other.starts_with('-') => path = Some(other.to_string()),
            other => bail!("unknown option {other}"),
        }
    }

    let path = match path.or_else(|| config.default_image.clone()) {
        Some(p) => p,
        None => {
            print_usage();
            bail!("no image given");
        }
    };

    let image = SpinImage::from_file(&path).with_context(|| format!("loading {path}"))?;
    println!("Loading: {path}");
    println!(
        "  clock: {} Hz (mode 0x{:02X}){}",
        image.clock_frequency,
        image.clock_mode,
        if image.checksum_ok() {
            ""
        } else {
            "  [checksum mismatch]"
        }
    );
    println!(
        "  object 0x{:04X}  variable 0x{:04X}  stack 0x{:04X}  entry 0x{:04X}",
        image.object_base, image.variable_base, image.stack_base, image.entry_pc
    );

    let mut machine = Machine::new();
    machine.load_image(&image);
    if let Some(cursor) = breakpoint {
        if let Some(cog) = machine.cog_mut(0) {
            cog.set_breakpoint(Some(cursor));
        }
    }

    let budget = ticks.unwrap_or_else(|| config.ticks());
    let outcome = machine.run(budget);

    println!();
    println!("Ran {} ticks.", outcome.ticks);
    if let Some(hit) = outcome.breakpoint {
        println!("Breakpoint: cog {} at 0x{:04X}", hit.cog, hit.pc);
    }

    println!();
    println!("Cog  State                Cursor  Instructions");
    for id in 0..8 {
        match machine.cog(id) {
            Some(cog) => println!(
                "{:>3}  {:<20} 0x{:04X}  {}",
                id,
                state_name(cog.run_state()),
                cog.pc(),
                cog.instructions()
            ),
            None => println!("{id:>3}  -"),
        }
    }

    Ok(())
}

fn state_name(state: RunState) -> &'static str {
    match state {
        RunState::Boot => "booting",
        RunState::Wait => "paced",
        RunState::Exec => "executing",
        RunState::WaitPinsEqual => "waiting on pins (eq)",
        RunState::WaitPinsNotEqual => "waiting on pins (ne)",
        RunState::WaitCount => "waiting on counter",
        RunState::WaitVideo => "waiting on video",
        RunState::Stopped => "stopped",
    }
}

/// Parse a decimal or 0x-prefixed number.
fn parse_number(text: &str) -> Result<u64> {
    let value = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)?
    } else {
        text.parse()?
    };
    Ok(value)
}

fn print_usage() {
    println!("usage: p8x-emu <image.binary> [--ticks N] [--breakpoint ADDR]");
    println!();
    println!("  --ticks N         tick budget for the run (default from config)");
    println!("  --breakpoint A    stop when cog 0 reaches bytecode address A");
}
