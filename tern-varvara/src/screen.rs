use crate::dirty::{Dirty, Rect};
use log::{debug, warn};
use std::mem::offset_of;
use uxn::{Ports, Uxn};
use zerocopy::{
    byteorder::{BigEndian, U16},
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
};

#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct ScreenPorts {
    vector: U16<BigEndian>,
    width: U16<BigEndian>,
    height: U16<BigEndian>,
    auto: Auto,
    _padding: u8,
    x: U16<BigEndian>,
    y: U16<BigEndian>,
    addr: U16<BigEndian>,
    pixel: Pixel,
    sprite: Sprite,
}

impl Ports for ScreenPorts {
    const BASE: u8 = 0x20;
}
static_assertions::assert_eq_size!(ScreenPorts, [u8; 16]);

impl ScreenPorts {
    // Size ports are read a byte at a time, and only take effect once their
    // low byte is written.
    const WIDTH_R: u8 = Self::BASE | offset_of!(Self, width) as u8;
    const WIDTH_W: u8 = Self::WIDTH_R + 1;
    const HEIGHT_R: u8 = Self::BASE | offset_of!(Self, height) as u8;
    const HEIGHT_W: u8 = Self::HEIGHT_R + 1;
    const PIXEL: u8 = Self::BASE | offset_of!(Self, pixel) as u8;
    const SPRITE: u8 = Self::BASE | offset_of!(Self, sprite) as u8;

    /// Ports which are handled on `DEI`
    pub const DEI_MASK: u16 = 0x003c;
    /// Ports which are handled on `DEO`
    pub const DEO_MASK: u16 = 0xc028;

    pub fn vector(&self) -> u16 {
        self.vector.get()
    }
}

/// Smallest allowed screen dimension
pub const MIN_SIZE: u16 = 8;
/// Largest allowed screen dimension
pub const MAX_SIZE: u16 = 1023;

/// Layer selector for drawing operations
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Layer {
    /// Drawn on top, where its color index is non-zero
    Foreground,
    /// Drawn underneath
    Background,
}

impl Layer {
    fn from_bit(b: bool) -> Self {
        if b {
            Layer::Foreground
        } else {
            Layer::Background
        }
    }
}

/// Decoder for the `pixel` port
#[derive(Copy, Clone, IntoBytes, FromBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct Pixel(u8);

impl Pixel {
    fn color(&self) -> u8 {
        self.0 & 0b11
    }
    fn fill(&self) -> bool {
        (self.0 & (1 << 7)) != 0
    }
    fn layer(&self) -> Layer {
        Layer::from_bit((self.0 & (1 << 6)) != 0)
    }
    fn flip_y(&self) -> bool {
        (self.0 & (1 << 5)) != 0
    }
    fn flip_x(&self) -> bool {
        (self.0 & (1 << 4)) != 0
    }
}

/// Decoder for the `sprite` port
#[derive(Copy, Clone, IntoBytes, FromBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct Sprite(u8);

impl Sprite {
    fn color(&self) -> u8 {
        self.0 & 0b1111
    }
    fn two_bpp(&self) -> bool {
        (self.0 & (1 << 7)) != 0
    }
    fn layer(&self) -> Layer {
        Layer::from_bit((self.0 & (1 << 6)) != 0)
    }
    fn flip_y(&self) -> bool {
        (self.0 & (1 << 5)) != 0
    }
    fn flip_x(&self) -> bool {
        (self.0 & (1 << 4)) != 0
    }
}

/// Decoder for the `auto` port
#[derive(Copy, Clone, IntoBytes, FromBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct Auto(u8);

impl Auto {
    fn len(&self) -> u8 {
        self.0 >> 4
    }
    fn addr(&self) -> bool {
        (self.0 & (1 << 2)) != 0
    }
    fn y(&self) -> bool {
        (self.0 & (1 << 1)) != 0
    }
    fn x(&self) -> bool {
        (self.0 & (1 << 0)) != 0
    }
}

/// Stored color for a given `[pixel][sprite color]` pair
pub const BLENDING: [[u8; 16]; 4] = [
    [0, 0, 0, 0, 1, 0, 1, 1, 2, 2, 0, 2, 3, 3, 3, 0],
    [0, 1, 2, 3, 0, 1, 2, 3, 0, 1, 2, 3, 0, 1, 2, 3],
    [1, 2, 3, 1, 1, 2, 3, 1, 1, 2, 3, 1, 1, 2, 3, 1],
    [2, 3, 1, 2, 2, 3, 1, 2, 2, 3, 1, 2, 2, 3, 1, 2],
];

/// Hex digit glyphs used by the debug overlay, one 8-byte tile per digit
#[rustfmt::skip]
const ICONS: [u8; 128] = [
    0x00, 0x7c, 0x82, 0x82, 0x82, 0x82, 0x82, 0x7c, // 0
    0x00, 0x30, 0x10, 0x10, 0x10, 0x10, 0x10, 0x10, // 1
    0x00, 0x7c, 0x82, 0x02, 0x7c, 0x80, 0x80, 0xfe, // 2
    0x00, 0x7c, 0x82, 0x02, 0x1c, 0x02, 0x82, 0x7c, // 3
    0x00, 0x0c, 0x14, 0x24, 0x44, 0x84, 0xfe, 0x04, // 4
    0x00, 0xfe, 0x80, 0x80, 0x7c, 0x02, 0x82, 0x7c, // 5
    0x00, 0x7c, 0x82, 0x80, 0xfc, 0x82, 0x82, 0x7c, // 6
    0x00, 0x7c, 0x82, 0x02, 0x1e, 0x02, 0x02, 0x02, // 7
    0x00, 0x7c, 0x82, 0x82, 0x7c, 0x82, 0x82, 0x7c, // 8
    0x00, 0x7c, 0x82, 0x82, 0x7e, 0x02, 0x82, 0x7c, // 9
    0x00, 0x7c, 0x82, 0x02, 0x7e, 0x82, 0x82, 0x7e, // A
    0x00, 0xfc, 0x82, 0x82, 0xfc, 0x82, 0x82, 0xfc, // B
    0x00, 0x7c, 0x82, 0x80, 0x80, 0x80, 0x82, 0x7c, // C
    0x00, 0xfc, 0x82, 0x82, 0x82, 0x82, 0x82, 0xfc, // D
    0x00, 0x7c, 0x82, 0x80, 0xf0, 0x80, 0x82, 0x7c, // E
    0x00, 0x7c, 0x82, 0x80, 0xf0, 0x80, 0x80, 0x80, // F
];

/// A sprite drawing request, decoded from the screen ports
#[derive(Copy, Clone, Debug)]
pub struct Blit {
    /// Target layer
    pub layer: Layer,
    /// Address of the first tile in RAM
    pub addr: u16,
    /// Left edge of the first tile
    pub x: u16,
    /// Top edge of the first tile
    pub y: u16,
    /// Blending mode, `0..16`
    pub color: u8,
    /// Mirror each tile horizontally
    pub flip_x: bool,
    /// Mirror each tile vertically
    pub flip_y: bool,
    /// Tiles are 16 bytes (two bit planes) rather than 8
    pub two_bpp: bool,
    /// Number of additional tiles to draw
    pub count: u8,
    /// Each tile moves 8 pixels down from the last
    pub step_x: bool,
    /// Each tile moves 8 pixels right from the last
    pub step_y: bool,
    /// Each tile reads from the next tile address
    pub step_addr: bool,
}

/// Two-layer indexed framebuffer, with an ARGB output buffer
pub struct Screen {
    width: u16,
    height: u16,

    /// Background layer, one 2-bit color index per pixel
    bg: Vec<u8>,
    /// Foreground layer, drawn over the background where non-zero
    fg: Vec<u8>,

    /// Rendered ARGB pixels, updated by [`Screen::redraw`]
    pixels: Vec<u32>,

    palette: [u32; 4],
    dirty: Dirty,

    /// Set when the screen size changes; cleared by the presentation layer
    resized: bool,
}

impl Screen {
    /// Builds a new screen, allocating buffers for the given size
    ///
    /// If the allocation fails, the screen is left empty (with size 0×0).
    pub fn new(width: u16, height: u16) -> Self {
        let mut out = Self {
            width: 0,
            height: 0,
            bg: vec![],
            fg: vec![],
            pixels: vec![],
            palette: [0xff000000; 4],
            dirty: Dirty::default(),
            resized: false,
        };
        out.resize(width, height);
        out
    }

    /// Returns the current size as a `(width, height)` tuple
    pub fn size(&self) -> (u16, u16) {
        (self.width, self.height)
    }

    /// Returns the most recently rendered frame, as ARGB values
    pub fn frame(&self) -> &[u32] {
        &self.pixels
    }

    /// Checks whether any part of the screen needs redrawing
    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Returns the region which will be updated by the next redraw
    pub fn dirty_rect(&self) -> Rect {
        self.dirty.rect()
    }

    /// Returns and clears the "resized" flag
    pub fn take_resized(&mut self) -> bool {
        std::mem::take(&mut self.resized)
    }

    fn change(&mut self, x1: u16, y1: u16, x2: u16, y2: u16) {
        self.dirty.change(x1, y1, x2, y2, self.width, self.height);
    }

    /// Marks the entire screen as dirty
    pub fn change_all(&mut self) {
        self.change(0, 0, self.width, self.height);
    }

    /// Resizes the screen, returning `false` if the size is invalid or
    /// allocation fails
    ///
    /// Resizing is all-or-nothing: on failure, the previous buffers and size
    /// are kept.  On success, the new buffers are cleared and the whole
    /// screen is marked dirty.
    pub fn resize(&mut self, width: u16, height: u16) -> bool {
        let valid = MIN_SIZE..=MAX_SIZE;
        if !valid.contains(&width) || !valid.contains(&height) {
            warn!("invalid screen size {width}×{height}");
            return false;
        }
        if width == self.width && height == self.height {
            return true;
        }
        let n = usize::from(width) * usize::from(height);
        let Some((bg, fg, pixels)) = Self::alloc(n) else {
            warn!("could not allocate {width}×{height} screen");
            return false;
        };
        self.bg = bg;
        self.fg = fg;
        self.pixels = pixels;
        self.width = width;
        self.height = height;
        self.resized = true;
        self.dirty = Dirty::default();
        self.change_all();
        debug!("resized screen to {width}×{height}");
        true
    }

    fn alloc(n: usize) -> Option<(Vec<u8>, Vec<u8>, Vec<u32>)> {
        let mut bg = Vec::new();
        bg.try_reserve_exact(n).ok()?;
        let mut fg = Vec::new();
        fg.try_reserve_exact(n).ok()?;
        let mut pixels = Vec::new();
        pixels.try_reserve_exact(n).ok()?;

        bg.resize(n, 0u8);
        fg.resize(n, 0u8);
        pixels.resize(n, 0u32);
        Some((bg, fg, pixels))
    }

    /// Loads the four-color palette from packed System color ports
    ///
    /// `raw` is the `red`, `green`, and `blue` shorts, each holding one
    /// nibble per palette entry.
    pub fn set_palette(&mut self, raw: &[u8; 6]) {
        for (i, p) in self.palette.iter_mut().enumerate() {
            let shift = if i % 2 == 0 { 4 } else { 0 };
            let r = u32::from(raw[i / 2] >> shift) & 0xF;
            let g = u32::from(raw[2 + i / 2] >> shift) & 0xF;
            let b = u32::from(raw[4 + i / 2] >> shift) & 0xF;
            let color = 0x0F000000 | (r << 16) | (g << 8) | b;
            *p = color | (color << 4);
        }
        self.change_all();
    }

    /// Returns the current palette, as ARGB values
    pub fn palette(&self) -> [u32; 4] {
        self.palette
    }

    fn layer_mut(&mut self, layer: Layer) -> &mut [u8] {
        match layer {
            Layer::Foreground => &mut self.fg,
            Layer::Background => &mut self.bg,
        }
    }

    fn layer(&self, layer: Layer) -> &[u8] {
        match layer {
            Layer::Foreground => &self.fg,
            Layer::Background => &self.bg,
        }
    }

    /// Reads a color index from one layer, or `None` if out of bounds
    pub fn pixel(&self, layer: Layer, x: u16, y: u16) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = usize::from(x) + usize::from(y) * usize::from(self.width);
        self.layer(layer).get(i).copied()
    }

    /// Writes a single pixel, ignoring out-of-bounds positions
    pub fn write_pixel(&mut self, layer: Layer, x: u16, y: u16, color: u8) {
        if x < self.width && y < self.height {
            let i = usize::from(x) + usize::from(y) * usize::from(self.width);
            self.layer_mut(layer)[i] = color & 0b11;
        }
        self.change(x, y, x.wrapping_add(1), y.wrapping_add(1));
    }

    /// Fills a rectangle running from `(x, y)` to the edges of the screen
    ///
    /// A flipped axis fills from 0 up to the coordinate instead.
    pub fn fill(
        &mut self,
        layer: Layer,
        mut x: u16,
        mut y: u16,
        color: u8,
        flip_x: bool,
        flip_y: bool,
    ) {
        let mut x2 = self.width;
        let mut y2 = self.height;
        if flip_x {
            x2 = x;
            x = 0;
        }
        if flip_y {
            y2 = y;
            y = 0;
        }
        let width = usize::from(self.width);
        let (xa, xb) = (usize::from(x), usize::from(x2.min(self.width)));
        let (ya, yb) = (usize::from(y), usize::from(y2.min(self.height)));
        if xa < xb {
            let buf = self.layer_mut(layer);
            for row in ya..yb {
                buf[row * width + xa..row * width + xb].fill(color & 0b11);
            }
        }
        self.change(x, y, x2, y2);
    }

    /// Draws one 8×8 tile, given each row as `lo | hi << 8`
    #[allow(clippy::too_many_arguments)]
    fn tile(
        &mut self,
        layer: Layer,
        rows: &[u16; 8],
        x1: u16,
        y1: u16,
        color: u8,
        flip_x: bool,
        flip_y: bool,
    ) {
        let (width, height) = (self.width, self.height);
        let opaque = color % 5 != 0;
        let blend = &BLENDING.map(|row| row[usize::from(color & 0xF)]);
        let buf = self.layer_mut(layer);
        for (v, &row) in (0u16..).zip(rows) {
            let y = y1.wrapping_add(if flip_y { 7 - v } else { v });
            let mut c = row;
            for h in (0u16..8).rev() {
                let ch = usize::from((c & 1) | ((c >> 7) & 2));
                c >>= 1;
                if !opaque && ch == 0 {
                    continue;
                }
                let x = x1.wrapping_add(if flip_x { 7 - h } else { h });
                if x < width && y < height {
                    let i = usize::from(x) + usize::from(y) * usize::from(width);
                    buf[i] = blend[ch];
                }
            }
        }
    }

    /// Draws a run of sprites, returning the address after the last tile
    ///
    /// Tiles are placed diagonally: with `step_x`, each tile lands 8 pixels
    /// below the previous one, and with `step_y`, 8 pixels to the right
    /// (negated by the matching flip).
    pub fn blit_sprite(&mut self, ram: &[u8; 65536], b: &Blit) -> u16 {
        let dx: u16 = if b.step_x { 8 } else { 0 };
        let dy: u16 = if b.step_y { 8 } else { 0 };
        let addr_step: u16 = match (b.step_addr, b.two_bpp) {
            (false, _) => 0,
            (true, false) => 8,
            (true, true) => 16,
        };
        let dyx = if b.flip_x { dy.wrapping_neg() } else { dy };
        let dxy = if b.flip_y { dx.wrapping_neg() } else { dx };

        let mut addr = b.addr;
        for i in 0..=u16::from(b.count) {
            let rows = std::array::from_fn(|v| {
                let v = v as u16;
                let lo = ram[usize::from(addr.wrapping_add(v))];
                let hi = if b.two_bpp {
                    ram[usize::from(addr.wrapping_add(v + 8))]
                } else {
                    0
                };
                u16::from_le_bytes([lo, hi])
            });
            let x = b.x.wrapping_add(dyx.wrapping_mul(i));
            let y = b.y.wrapping_add(dxy.wrapping_mul(i));
            self.tile(b.layer, &rows, x, y, b.color, b.flip_x, b.flip_y);
            addr = addr.wrapping_add(addr_step);
        }
        let n = u16::from(b.count);
        let (x1, x2) = Self::run_span(b.x, dyx, n, b.flip_x && b.step_y);
        let (y1, y2) = Self::run_span(b.y, dxy, n, b.flip_y && b.step_x);
        self.change(x1, y1, x2, y2);
        addr
    }

    /// Returns the span covered by `n + 1` tiles starting at `start`
    ///
    /// When `backwards` is set, `step` is a negated offset and the run ends
    /// left of (or above) its first tile.
    fn run_span(start: u16, step: u16, n: u16, backwards: bool) -> (u16, u16) {
        let last = start.wrapping_add(step.wrapping_mul(n));
        if backwards {
            (last, start.wrapping_add(8))
        } else {
            (start, last.wrapping_add(8))
        }
    }

    /// Renders the dirty region into the ARGB pixel buffer
    ///
    /// Foreground pixels with a non-zero index hide the background.
    pub fn redraw(&mut self) {
        let Some(r) = self.dirty.take() else {
            return;
        };
        let palette: [u32; 16] = std::array::from_fn(|i| {
            self.palette[if (i >> 2) != 0 { i >> 2 } else { i & 3 }]
        });
        let width = usize::from(self.width);
        for y in usize::from(r.y1)..usize::from(r.y2) {
            for x in usize::from(r.x1)..usize::from(r.x2) {
                let i = x + y * width;
                let c = (self.fg[i] << 2) | self.bg[i];
                self.pixels[i] = palette[usize::from(c & 0xF)];
            }
        }
    }

    /// Draws a byte as two hex digits into the foreground layer
    ///
    /// This does not mark the screen as dirty.
    fn draw_byte(&mut self, v: u8, x: u16, y: u16, color: u8) {
        for (i, nibble) in [v >> 4, v & 0xF].into_iter().enumerate() {
            let glyph = &ICONS[usize::from(nibble) * 8..][..8];
            let rows = std::array::from_fn(|r| u16::from(glyph[r]));
            let x = x.wrapping_add(i as u16 * 8);
            self.tile(Layer::Foreground, &rows, x, y, color, false, false);
        }
    }

    /// Draws the debug overlay: both stacks and the zero page
    pub fn debugger(&mut self, vm: &Uxn) {
        let h = self.height;
        for (i, &b) in (0u16..).zip(vm.stack().data()) {
            self.draw_byte(b, i * 0x18 + 0x8, h.wrapping_sub(0x18), 0x2);
        }
        for (i, &b) in (0u16..).zip(vm.ret().data()) {
            self.draw_byte(b, i * 0x18 + 0x8, h.wrapping_sub(0x10), 0x3);
        }
        for (i, &b) in (0u16..).zip(&vm.ram()[..0x40]) {
            let color = if b != 0 { 2 } else { 1 };
            self.draw_byte(b, (i & 0x7) * 0x18 + 0x8, (i >> 3) * 8 + 0x8, color);
        }
    }

    /// Executes the `pixel` port operation
    fn pixel_port(&mut self, vm: &mut Uxn) {
        let v = vm.dev::<ScreenPorts>();
        let (p, auto) = (v.pixel, v.auto);
        let (x, y) = (v.x.get(), v.y.get());

        if p.fill() {
            self.fill(p.layer(), x, y, p.color(), p.flip_x(), p.flip_y());
        } else {
            self.write_pixel(p.layer(), x, y, p.color());
            let v = vm.dev_mut::<ScreenPorts>();
            if auto.x() {
                v.x.set(x.wrapping_add(1));
            }
            if auto.y() {
                v.y.set(y.wrapping_add(1));
            }
        }
    }

    /// Executes the `sprite` port operation
    fn sprite_port(&mut self, vm: &mut Uxn) {
        let v = vm.dev::<ScreenPorts>();
        let (s, auto) = (v.sprite, v.auto);
        let blit = Blit {
            layer: s.layer(),
            addr: v.addr.get(),
            x: v.x.get(),
            y: v.y.get(),
            color: s.color(),
            flip_x: s.flip_x(),
            flip_y: s.flip_y(),
            two_bpp: s.two_bpp(),
            count: auto.len(),
            step_x: auto.x(),
            step_y: auto.y(),
            step_addr: auto.addr(),
        };
        let addr = self.blit_sprite(vm.ram(), &blit);

        let v = vm.dev_mut::<ScreenPorts>();
        if auto.x() {
            v.x.set(if blit.flip_x {
                blit.x.wrapping_sub(8)
            } else {
                blit.x.wrapping_add(8)
            });
        }
        if auto.y() {
            v.y.set(if blit.flip_y {
                blit.y.wrapping_sub(8)
            } else {
                blit.y.wrapping_add(8)
            });
        }
        if auto.addr() {
            v.addr.set(addr);
        }
    }

    /// Executes a `DEO` operation against the screen
    pub fn deo(&mut self, vm: &mut Uxn, target: u8) {
        match target {
            ScreenPorts::WIDTH_W => {
                let w = vm.dev::<ScreenPorts>().width.get();
                self.resize(w, self.height);
            }
            ScreenPorts::HEIGHT_W => {
                let h = vm.dev::<ScreenPorts>().height.get();
                self.resize(self.width, h);
            }
            ScreenPorts::PIXEL => self.pixel_port(vm),
            ScreenPorts::SPRITE => self.sprite_port(vm),
            _ => (),
        }
    }

    /// Executes a `DEI` operation against the screen
    pub fn dei(&self, vm: &Uxn, target: u8) -> u8 {
        let [wh, wl] = self.width.to_be_bytes();
        let [hh, hl] = self.height.to_be_bytes();
        match target {
            ScreenPorts::WIDTH_R => wh,
            ScreenPorts::WIDTH_W => wl,
            ScreenPorts::HEIGHT_R => hh,
            ScreenPorts::HEIGHT_W => hl,
            _ => vm.read_dev_mem(target),
        }
    }
}
