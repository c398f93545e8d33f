use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use pqc::ast::{ClassicalType, Defcal, Expression as E, GateCall, Program, Statement, TimeUnit};
use pqc::pipeline::Compiler;
use pqc::seqc::SeqcPrinter;
use pqc::setup::Setup;
use pqc::shots::ShotsSignature;

const SETUP_JSON: &str = r#"{
  "instruments": {
    "hdawg1": { "name": "hdawg1", "type": "HDAWG8", "serial": "DEV8001" },
    "shfqa1": { "name": "shfqa1", "type": "SHFQA4", "serial": "DEV12001" }
  },
  "ports": {
    "ch1": {
      "name": "ch1",
      "instrument": "hdawg1",
      "core": { "type": "Hd", "index": 1, "channels": [1] }
    },
    "ch2": {
      "name": "ch2",
      "instrument": "shfqa1",
      "core": { "type": "Qa", "index": 1, "channels": [1, 2] }
    }
  },
  "frames": {}
}"#;

fn setup() -> Setup {
    Setup::from_json(SETUP_JSON).expect("bench setup is valid")
}

/// A cal block defining one drive gate, followed by `n_gates` calls.
fn drive_program(n_gates: usize) -> Program {
    let mut statements = vec![Statement::Calibration {
        body: vec![
            Statement::ClassicalDeclaration {
                ty: ClassicalType::Port,
                name: "ch1".to_string(),
                init: None,
            },
            Statement::ClassicalDeclaration {
                ty: ClassicalType::Frame,
                name: "drive_frame".to_string(),
                init: Some(E::call(
                    "newframe",
                    vec![E::ident("ch1"), E::float(5.0e9), E::float(0.0)],
                )),
            },
            Statement::Defcal(Defcal {
                name: "x".to_string(),
                args: vec![],
                qubits: vec!["$0".to_string()],
                return_type: None,
                body: vec![Statement::Expression(E::call(
                    "play",
                    vec![
                        E::ident("drive_frame"),
                        E::call("ones", vec![E::duration(24.0, TimeUnit::Ns)]),
                    ],
                ))],
            }),
        ],
    }];
    for _ in 0..n_gates {
        statements.push(Statement::GateCall(GateCall {
            modifiers: vec![],
            name: "x".to_string(),
            args: vec![],
            qubits: vec![E::ident("$0")],
        }));
    }
    Program::new(statements)
}

// Full pipeline latency vs program size.
fn bench_full_compile(c: &mut Criterion) {
    let setup = setup();
    let mut group = c.benchmark_group("compile/full");
    for n_gates in [1usize, 16, 64, 256] {
        let program = drive_program(n_gates);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{n_gates}gates")),
            &program,
            |b, program| {
                b.iter(|| {
                    let compiled = Compiler::new(program.clone(), setup.clone())
                        .compile()
                        .expect("bench program compiles");
                    black_box(&compiled);
                });
            },
        );
    }
    group.finish();
}

// Printer latency in isolation, without the program-level passes.
fn bench_seqc_printer(c: &mut Criterion) {
    let setup = setup();
    let mut program = drive_program(64);
    pqc::transform::transform_durations(&mut program);
    c.bench_function("print/64gates", |b| {
        b.iter(|| {
            let printer = SeqcPrinter::new(setup.clone(), ShotsSignature::default());
            let output = printer.print(&program).expect("bench program prints");
            black_box(&output);
        });
    });
}

// Defcal matching over a growing candidate set.
fn bench_signature_matching(c: &mut Criterion) {
    use pqc::mangle::{first_match, FunctionSignature};

    let mut group = c.benchmark_group("mangle/match");
    for n_candidates in [4usize, 32, 128] {
        let candidates: Vec<String> = (0..n_candidates)
            .map(|i| {
                let mut sig = FunctionSignature::new("rx");
                sig.params = vec![format!("{}", i * 10)];
                sig.qubits = vec![format!("${i}")];
                sig.mangle()
            })
            .collect();
        let mut call = FunctionSignature::new("rx");
        call.params = vec!["0".to_string()];
        call.qubits = vec!["$0".to_string()];
        group.bench_with_input(
            BenchmarkId::from_parameter(n_candidates),
            &candidates,
            |b, candidates| {
                b.iter(|| {
                    let best = first_match(black_box(&call), candidates)
                        .expect("call has a match");
                    black_box(&best);
                });
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_full_compile,
    bench_seqc_printer,
    bench_signature_matching,
);
criterion_main!(benches);
