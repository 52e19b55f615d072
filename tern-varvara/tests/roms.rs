use tern_varvara::{Layer, Varvara};
use uxn::{FaultKind, Uxn, PAGE_PROGRAM};

const OPCODES: [&str; 32] = [
    "BRK", "INC", "POP", "NIP", "SWP", "ROT", "DUP", "OVR", //
    "EQU", "NEQ", "GTH", "LTH", "JMP", "JCN", "JSR", "STH", //
    "LDZ", "STZ", "LDR", "STR", "LDA", "STA", "DEI", "DEO", //
    "ADD", "SUB", "MUL", "DIV", "AND", "ORA", "EOR", "SFT",
];

/// Assembles `#12` / `#1234` literals and opcodes like `DEO2`
fn asm(s: &str) -> Vec<u8> {
    let mut out = vec![];
    for t in s.split_whitespace() {
        if let Some(h) = t.strip_prefix('#') {
            if h.len() == 2 {
                out.extend([0x80, u8::from_str_radix(h, 16).unwrap()]);
            } else {
                out.push(0xa0);
                out.extend(u16::from_str_radix(h, 16).unwrap().to_be_bytes());
            }
            continue;
        }
        let (name, modes) = t.split_at(3);
        let mut op = OPCODES.iter().position(|&n| n == name).unwrap() as u8;
        for c in modes.chars() {
            op |= match c {
                '2' => 0x20,
                'r' => 0x40,
                'k' => 0x80,
                _ => panic!("invalid mode {c}"),
            };
        }
        out.push(op);
    }
    out
}

fn boot(rom: &[u8], args: &[String]) -> (Uxn, Varvara) {
    let mut vm = Uxn::new();
    let mut dev = Varvara::new();
    let extra = vm.load(rom);
    dev.reset(&mut vm, extra);
    dev.init_args(&mut vm, args);
    vm.eval(&mut dev, PAGE_PROGRAM);
    (vm, dev)
}

#[test]
fn hello() {
    let (_vm, mut dev) = boot(&asm("#48 #18 DEO #69 #18 DEO BRK"), &[]);
    let out = dev.output();
    assert_eq!(out.stdout, b"Hi");
    assert!(out.stderr.is_empty());
    assert!(out.exit.is_none());
    assert!(out.fault.is_none());
    assert_eq!(out.size, (512, 320));
}

#[test]
fn console_echo() {
    // The reset vector installs an echo handler at 0x107
    let rom = asm("#0107 #10 DEO2 BRK #12 DEI #18 DEO BRK");
    let args = vec!["ab".to_owned(), "c".to_owned()];
    let (mut vm, mut dev) = boot(&rom, &args);
    assert_eq!(vm.read_dev_mem(0x17), 1);

    let out = dev.send_args(&mut vm, &args);
    assert_eq!(out.stdout, b"ab\nc\n");
    assert_eq!(vm.read_dev_mem(0x17), 1);

    let out = dev.console(&mut vm, b'z');
    assert_eq!(out.stdout, b"z");
}

#[test]
fn no_args_leaves_type_clear() {
    let (vm, _dev) = boot(&asm("BRK"), &[]);
    assert_eq!(vm.read_dev_mem(0x17), 0);
}

#[test]
fn palette_and_pixel() {
    let rom = asm(
        "#f000 #08 DEO2 #0000 #0a DEO2 #0000 #0c DEO2 \
         #0002 #28 DEO2 #0003 #2a DEO2 #41 #2e DEO BRK",
    );
    let (mut vm, mut dev) = boot(&rom, &[]);
    assert_eq!(dev.screen().pixel(Layer::Foreground, 2, 3), Some(1));
    assert!(dev.screen().is_dirty());

    dev.redraw(&mut vm);
    assert!(!dev.screen().is_dirty());
    let out = dev.output();
    assert!(out.resized);
    assert_eq!(out.frame[0], 0xffff0000);
    assert_eq!(out.frame[2 + 3 * 512], 0xff000000);
}

#[test]
fn resize_through_ports() {
    let rom = asm("#0040 #22 DEO2 #0030 #24 DEO2 #22 DEI2 #24 DEI2 BRK");
    let (vm, mut dev) = boot(&rom, &[]);
    assert_eq!(vm.stack().data(), &[0x00, 0x40, 0x00, 0x30]);
    let out = dev.output();
    assert_eq!(out.size, (64, 48));
    assert_eq!(out.frame.len(), 64 * 48);
}

#[test]
fn sprite_with_auto() {
    // Two tiles, stepping down, reading the same solid tile at 0x200
    let mut rom = asm(
        "#0200 #2c DEO2 #11 #26 DEO #01 #2f DEO \
         #28 DEI2 #2a DEI2 #2c DEI2 BRK",
    );
    rom.resize(0x100, 0);
    rom.extend([0xff; 8]);
    let (vm, dev) = boot(&rom, &[]);

    let s = dev.screen();
    assert_eq!(s.pixel(Layer::Background, 0, 0), Some(1));
    assert_eq!(s.pixel(Layer::Background, 7, 15), Some(1));
    assert_eq!(s.pixel(Layer::Background, 8, 0), Some(0));
    assert_eq!(s.pixel(Layer::Background, 0, 16), Some(0));
    // x advanced by 8, y and addr left alone
    assert_eq!(vm.stack().data(), &[0x00, 0x08, 0x00, 0x00, 0x02, 0x00]);
}

#[test]
fn fault_is_reported() {
    let mut vm = Uxn::new();
    let mut dev = Varvara::new();
    vm.load(&asm("#01 #00 DIV BRK"));
    dev.reset(&mut vm, &[]);
    assert!(!vm.eval(&mut dev, PAGE_PROGRAM));

    let out = dev.output();
    let fault = out.fault.expect("missing fault");
    assert_eq!(fault.kind, FaultKind::DivideByZero);
    assert_eq!(fault.addr, PAGE_PROGRAM + 4);
    assert_eq!(fault.instr, 0x1b);
    assert!(dev.output().fault.is_none());
}

#[test]
fn exit_halts() {
    let (mut vm, mut dev) = boot(&asm("#81 #0f DEO #01 BRK"), &[]);
    assert_eq!(dev.output().exit, Some(1));
    assert!(vm.halted());
    // Execution continues until the end of the current vector
    assert_eq!(vm.stack().data(), &[0x01]);
    assert!(!vm.eval(&mut dev, PAGE_PROGRAM));
}

#[test]
fn debug_port() {
    let (mut vm, mut dev) = boot(&asm("#12 #01 #0e DEO BRK"), &[]);
    let out = dev.output();
    let stderr = String::from_utf8(out.stderr).unwrap();
    assert!(stderr.contains("WST 00 00 00 00 00 00 00|12 <"), "{stderr}");

    dev.redraw(&mut vm);
    // The zero page is blank, so the overlay draws '0' digits in color 1
    assert_eq!(dev.screen().pixel(Layer::Foreground, 9, 9), Some(1));
    assert!(!dev.screen().is_dirty());
}
