//! The Varvara computer system
#![warn(missing_docs)]
use log::{error, warn};
use std::io::Write;

mod console;
mod dirty;
mod screen;
mod system;

pub use console::Type as ConsoleType;
pub use dirty::Rect;
pub use screen::{Blit, Layer, Screen, BLENDING, MAX_SIZE, MIN_SIZE};

use console::ConsolePorts;
use screen::ScreenPorts;
use system::SystemPorts;
use uxn::{Device, Fault, Ports, Uxn};

/// Default screen width, in pixels
pub const WIDTH: u16 = 512;
/// Default screen height, in pixels
pub const HEIGHT: u16 = 320;

/// Output from the system, which may modify the presentation layer
pub struct Output<'a> {
    /// Current screen size
    pub size: (u16, u16),

    /// The screen has been resized since the last output
    pub resized: bool,

    /// Current screen contents, as ARGB values
    pub frame: &'a [u32],

    /// Outgoing console characters sent to the `write` port
    pub stdout: Vec<u8>,

    /// Outgoing console characters sent to the `error` port
    pub stderr: Vec<u8>,

    /// Request to exit with the given error code
    pub exit: Option<i32>,

    /// Most recent CPU fault, if one occurred
    pub fault: Option<Fault>,
}

impl Output<'_> {
    /// Prints `stdout` and `stderr` to the console
    pub fn print(&self) -> std::io::Result<()> {
        if !self.stdout.is_empty() {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&self.stdout)?;
            stdout.flush()?;
        }
        if !self.stderr.is_empty() {
            let mut stderr = std::io::stderr().lock();
            stderr.write_all(&self.stderr)?;
            stderr.flush()?;
        }
        Ok(())
    }

    /// Checks the results
    ///
    /// `stdout` and `stderr` are printed, and `exit(..)` is called if it has
    /// been requested by the VM.
    pub fn check(&self) -> std::io::Result<()> {
        self.print()?;
        if let Some(e) = self.exit {
            std::process::exit(e);
        }
        Ok(())
    }
}

/// Handle to the Varvara system
pub struct Varvara {
    system: system::System,
    console: console::Console,
    screen: screen::Screen,

    /// Fault recorded by [`Device::halt`], reported in the next [`Output`]
    fault: Option<Fault>,
}

impl Default for Varvara {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for Varvara {
    fn dei(&mut self, vm: &mut Uxn, target: u8) -> u8 {
        match target & 0xF0 {
            ScreenPorts::BASE => self.screen.dei(vm, target),
            _ => vm.read_dev_mem(target),
        }
    }

    fn deo(&mut self, vm: &mut Uxn, target: u8) {
        match target & 0xF0 {
            SystemPorts::BASE => self.system_deo(vm, target),
            ConsolePorts::BASE => self.console.deo(vm, target),
            ScreenPorts::BASE => self.screen.deo(vm, target),
            _ => (),
        }
    }

    fn halt(&mut self, _vm: &mut Uxn, fault: Fault) -> bool {
        error!("{fault}");
        self.fault = Some(fault);
        false
    }
}

impl Varvara {
    /// Builds a new instance of the Varvara peripherals
    pub fn new() -> Self {
        Self {
            system: system::System::new(),
            console: console::Console::new(),
            screen: screen::Screen::new(WIDTH, HEIGHT),
            fault: None,
        }
    }

    /// Resets the peripherals and connects their ports to the given VM
    ///
    /// `extra` is the part of the ROM which did not fit in memory, as returned
    /// by [`Uxn::load`]; it is reported and discarded.
    pub fn reset(&mut self, vm: &mut Uxn, extra: &[u8]) {
        vm.connect(0x0, SystemPorts::DEI_MASK, SystemPorts::DEO_MASK);
        vm.connect(0x1, ConsolePorts::DEI_MASK, ConsolePorts::DEO_MASK);
        vm.connect(0x2, ScreenPorts::DEI_MASK, ScreenPorts::DEO_MASK);
        if !extra.is_empty() {
            warn!(
                "ROM is too large; ignoring {} bytes past the end of memory",
                extra.len()
            );
        }
        self.system = system::System::new();
        self.fault = None;
        self.screen.resize(WIDTH, HEIGHT);
    }

    /// Flags pending arguments in the console's type port
    ///
    /// This should be called before the reset vector runs.
    pub fn init_args(&mut self, vm: &mut Uxn, args: &[String]) {
        if !args.is_empty() {
            self.console.set_type(vm, console::Type::Stdin);
        }
    }

    /// Returns the current screen size
    pub fn screen_size(&self) -> (u16, u16) {
        self.screen.size()
    }

    /// Borrows the screen device
    pub fn screen(&self) -> &Screen {
        &self.screen
    }

    fn system_deo(&mut self, vm: &mut Uxn, target: u8) {
        self.system.deo(vm, target);
        if SystemPorts::is_palette(target) {
            let raw = vm.dev::<SystemPorts>().palette();
            self.screen.set_palette(&raw);
        } else if target == SystemPorts::DEBUG {
            self.console.write_stderr(&system::inspect(vm));
        }
    }

    /// Calls the screen vector, then renders any changes
    ///
    /// This function should be called at 60 Hz
    pub fn redraw(&mut self, vm: &mut Uxn) {
        let vector = vm.dev::<ScreenPorts>().vector();
        vm.eval(self, vector);

        let debug = vm.dev::<SystemPorts>().debug();
        if debug {
            self.screen.change_all();
        }
        if self.screen.is_dirty() {
            self.screen.redraw();
            if debug {
                self.screen.debugger(vm);
            }
        }
    }

    /// Delivers a byte of `stdin` to the console vector
    pub fn console(&mut self, vm: &mut Uxn, c: u8) -> Output<'_> {
        let vector = self.console.input(vm, c, console::Type::Stdin);
        vm.eval(self, vector);
        self.output()
    }

    /// Sends arguments to the console device
    ///
    /// Leaves the console type set to `stdin`, and returns the current output
    /// state of the system
    pub fn send_args(&mut self, vm: &mut Uxn, args: &[String]) -> Output<'_> {
        for (i, a) in args.iter().enumerate() {
            for c in a.bytes() {
                let v = self.console.input(vm, c, console::Type::Argument);
                vm.eval(self, v);
            }
            let ty = if i == args.len() - 1 {
                console::Type::ArgumentEnd
            } else {
                console::Type::ArgumentSpacer
            };
            let v = self.console.input(vm, b'\n', ty);
            vm.eval(self, v);
        }
        self.console.set_type(vm, console::Type::Stdin);
        self.output()
    }

    /// Returns the current output state of the system
    ///
    /// This is not idempotent; the output is taken from various accumulators
    /// and will be empty if this is called multiple times.
    #[must_use]
    pub fn output(&mut self) -> Output<'_> {
        Output {
            size: self.screen.size(),
            resized: self.screen.take_resized(),
            frame: self.screen.frame(),
            stdout: self.console.stdout(),
            stderr: self.console.stderr(),
            exit: self.system.exit(),
            fault: self.fault.take(),
        }
    }
}
