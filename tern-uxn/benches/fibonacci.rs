use criterion::{criterion_group, criterion_main, Criterion};
use tern_uxn::{EmptyDevice, Uxn, PAGE_PROGRAM};

/// Recursive Fibonacci, leaving `fib(n)` as a short on the stack
///
/// ```text
/// #n ;fib JSR2 BRK
/// @fib DUP #02 LTH ,&base JCN
///     DUP #01 SUB ;fib JSR2 ROT #02 SUB ;fib JSR2 ADD2 JMP2r
///     &base #00 SWP JMP2r
/// ```
fn fib_rom(n: u8) -> Vec<u8> {
    vec![
        0x80, n, // LIT n
        0xa0, 0x01, 0x07, // LIT2 0107
        0x2e, // JSR2
        0x00, // BRK
        // fib @ 0x107: ( n -- fib16 )
        0x06, // DUP
        0x80, 0x02, // LIT 02
        0x0b, // LTH
        0x80, 0x12, // LIT 12
        0x0d, // JCN
        0x06, // DUP
        0x80, 0x01, // LIT 01
        0x19, // SUB
        0xa0, 0x01, 0x07, // LIT2 0107
        0x2e, // JSR2 ( n fib[n-1] )
        0x05, // ROT  ( fib[n-1] n )
        0x80, 0x02, // LIT 02
        0x19, // SUB
        0xa0, 0x01, 0x07, // LIT2 0107
        0x2e, // JSR2 ( fib[n-1] fib[n-2] )
        0x38, // ADD2
        0x6c, // JMP2r
        // base case @ 0x120: ( n -- 00 n )
        0x80, 0x00, // LIT 00
        0x04, // SWP
        0x6c, // JMP2r
    ]
}

pub fn fibonacci(c: &mut Criterion) {
    let rom = fib_rom(20);
    c.bench_function("fib(20)", |b| {
        b.iter(|| {
            let mut vm = Uxn::new();
            vm.load(std::hint::black_box(&rom));
            vm.eval(&mut EmptyDevice, PAGE_PROGRAM);
            assert_eq!(vm.stack().data(), &[0x1a, 0x6d]);
        })
    });
}

criterion_group!(benches, fibonacci);
criterion_main!(benches);
