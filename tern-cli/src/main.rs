use std::io::Read;
use std::path::{Path, PathBuf};

use uxn::{Uxn, PAGE_PROGRAM};
use varvara::{Output, Varvara};

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};

/// Headless Uxn runner
#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// ROM to load and execute
    rom: PathBuf,

    /// Number of frames to run the screen vector
    #[clap(long, default_value_t = 1)]
    frames: usize,

    /// Deliver everything read from stdin to the console vector
    #[clap(long)]
    stdin: bool,

    /// Save the final frame as a PNG image
    #[clap(long)]
    screenshot: Option<PathBuf>,

    /// Arguments to pass into the VM
    #[arg(last = true)]
    args: Vec<String>,
}

/// Prints console output, returning the exit code if one was requested
fn handle(out: Output) -> Result<Option<i32>> {
    out.print().context("failed to print console output")?;
    if let Some(f) = out.fault {
        warn!("evaluation aborted: {f}");
    }
    Ok(out.exit)
}

fn save_screenshot(dev: &Varvara, path: &Path) -> Result<()> {
    let (width, height) = dev.screen_size();
    let pixels = dev
        .screen()
        .frame()
        .iter()
        .flat_map(|p| {
            let [a, r, g, b] = p.to_be_bytes();
            [r, g, b, a]
        })
        .collect();
    let img = image::RgbaImage::from_raw(width.into(), height.into(), pixels)
        .context("frame does not match screen size")?;
    img.save(path)
        .with_context(|| format!("failed to save {path:?}"))?;
    info!("saved {width}×{height} screenshot to {path:?}");
    Ok(())
}

fn run(args: &Args, vm: &mut Uxn, dev: &mut Varvara) -> Result<Option<i32>> {
    if let Some(e) = handle(dev.output())? {
        return Ok(Some(e));
    }
    if let Some(e) = handle(dev.send_args(vm, &args.args))? {
        return Ok(Some(e));
    }

    if args.stdin {
        let mut input = vec![];
        std::io::stdin()
            .read_to_end(&mut input)
            .context("failed to read stdin")?;
        for c in input {
            if let Some(e) = handle(dev.console(vm, c))? {
                return Ok(Some(e));
            }
        }
    }

    for _ in 0..args.frames {
        if vm.halted() {
            break;
        }
        dev.redraw(vm);
        if let Some(e) = handle(dev.output())? {
            return Ok(Some(e));
        }
    }
    Ok(None)
}

fn main() -> Result<()> {
    let env = env_logger::Env::default()
        .filter_or("UXN_LOG", "info")
        .write_style_or("UXN_LOG", "always");
    env_logger::init_from_env(env);

    let args = Args::parse();
    let mut f = std::fs::File::open(&args.rom)
        .with_context(|| format!("failed to open {:?}", args.rom))?;

    let mut rom = vec![];
    f.read_to_end(&mut rom).context("failed to read file")?;

    let mut vm = Uxn::new();
    let mut dev = Varvara::new();
    let extra = vm.load(&rom);
    dev.reset(&mut vm, extra);
    dev.init_args(&mut vm, &args.args);

    // Run the reset vector
    let start = std::time::Instant::now();
    vm.eval(&mut dev, PAGE_PROGRAM);
    info!("startup complete in {:?}", start.elapsed());

    let exit = run(&args, &mut vm, &mut dev)?;

    if let Some(path) = &args.screenshot {
        save_screenshot(&dev, path)?;
    }
    if let Some(e) = exit {
        std::process::exit(e);
    }
    Ok(())
}
