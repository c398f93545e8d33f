// Snapshot tests: lock emitted SEQC to detect unintended codegen changes.
//
// Uses the library API (Compiler::new(...).compile()) on hand-built ASTs.
// Snapshots are managed by `insta` and stored under
// `compiler/tests/snapshots/`.
//
// Run `cargo insta review` after intentional output changes to update
// baselines.

use pqc::ast::{
    ClassicalType, Defcal, Expression as E, ForIn, GateCall, Measurement, Program, Statement,
    TimeUnit,
};
use pqc::pipeline::{CompiledProgram, Compiler};
use pqc::setup::Setup;

const DRIVE_SETUP: &str = r#"{
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

const READOUT_SETUP: &str = r#"{
  "instruments": {
    "shfqa1": { "name": "shfqa1", "type": "SHFQA4", "serial": "DEV12001" }
  },
  "ports": {
    "tx": {
      "name": "tx",
      "instrument": "shfqa1",
      "core": { "type": "Qa", "index": 1, "channels": [1] }
    },
    "rx": {
      "name": "rx",
      "instrument": "shfqa1",
      "core": { "type": "Qa", "index": 1, "channels": [2] }
    }
  },
  "frames": {}
}"#;

fn port_decl(name: &str) -> Statement {
    Statement::ClassicalDeclaration {
        ty: ClassicalType::Port,
        name: name.to_string(),
        init: None,
    }
}

fn frame_decl(name: &str, port: &str, frequency: f64) -> Statement {
    Statement::ClassicalDeclaration {
        ty: ClassicalType::Frame,
        name: name.to_string(),
        init: Some(E::call(
            "newframe",
            vec![E::ident(port), E::float(frequency), E::float(0.0)],
        )),
    }
}

fn compile(program: Program, setup_json: &str) -> CompiledProgram {
    let setup = Setup::from_json(setup_json).unwrap();
    Compiler::new(program, setup).compile().unwrap()
}

/// One section per core, in core order.
fn render(compiled: &CompiledProgram) -> String {
    let mut out = String::new();
    for ((instrument, index, ty), core) in &compiled.cores {
        out.push_str(&format!("// {instrument} {} core {index}\n", ty.as_str()));
        if core.seqc.is_empty() {
            out.push_str("// (no statements)\n");
        } else {
            out.push_str(&core.seqc);
        }
    }
    out
}

#[test]
fn hd_drive_gate() {
    let program = Program::new(vec![
        Statement::Calibration {
            body: vec![
                port_decl("ch1"),
                frame_decl("drive_frame", "ch1", 5.0e9),
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
        },
        Statement::GateCall(GateCall {
            modifiers: vec![],
            name: "x".to_string(),
            args: vec![],
            qubits: vec![E::ident("$0")],
        }),
    ]);
    let compiled = compile(program, DRIVE_SETUP);
    insta::assert_snapshot!("hd_drive_gate", render(&compiled));
}

#[test]
fn qa_frequency_sweep() {
    let program = Program::new(vec![Statement::Calibration {
        body: vec![
            port_decl("ch2"),
            frame_decl("readout_frame", "ch2", 6.4e9),
            Statement::ForIn(ForIn {
                ty: ClassicalType::Int { size: None },
                variable: "i".to_string(),
                set: E::Range {
                    start: Some(Box::new(E::int(0))),
                    end: Some(Box::new(E::int(10))),
                    step: None,
                },
                block: vec![Statement::Expression(E::call(
                    "set_frequency",
                    vec![
                        E::ident("readout_frame"),
                        E::binary(
                            pqc::ast::BinaryOperator::Times,
                            E::ident("i"),
                            E::int(1000000),
                        ),
                    ],
                ))],
            }),
        ],
    }]);
    let compiled = compile(program, DRIVE_SETUP);
    insta::assert_snapshot!("qa_frequency_sweep", render(&compiled));
}

#[test]
fn qa_discriminated_readout() {
    let program = Program::new(vec![
        Statement::ClassicalDeclaration {
            ty: ClassicalType::Bit { size: None },
            name: "b".to_string(),
            init: None,
        },
        Statement::Calibration {
            body: vec![
                port_decl("tx"),
                port_decl("rx"),
                frame_decl("tx_frame", "tx", 6.4e9),
                frame_decl("rx_frame", "rx", 6.4e9),
                Statement::Defcal(Defcal {
                    name: "measure".to_string(),
                    args: vec![],
                    qubits: vec!["$0".to_string()],
                    return_type: Some(ClassicalType::Bit { size: None }),
                    body: vec![
                        Statement::Expression(E::call(
                            "play",
                            vec![E::ident("tx_frame"), E::call("ones", vec![E::int(2048)])],
                        )),
                        Statement::Return(Some(E::call(
                            "capture_v2",
                            vec![E::ident("rx_frame"), E::call("ones", vec![E::int(2048)])],
                        ))),
                    ],
                }),
            ],
        },
        Statement::Measurement(Measurement {
            qubit: E::ident("$0"),
            target: Some(E::ident("b")),
        }),
    ]);
    let compiled = compile(program, READOUT_SETUP);
    insta::assert_snapshot!("qa_discriminated_readout", render(&compiled));
}

#[test]
fn hd_duration_sweep() {
    let duration = E::binary(
        pqc::ast::BinaryOperator::Plus,
        E::int(32),
        E::binary(pqc::ast::BinaryOperator::Times, E::ident("i"), E::int(16)),
    );
    let program = Program::new(vec![Statement::Calibration {
        body: vec![
            port_decl("ch1"),
            frame_decl("drive_frame", "ch1", 5.0e9),
            Statement::ForIn(ForIn {
                ty: ClassicalType::Int { size: None },
                variable: "i".to_string(),
                set: E::Range {
                    start: Some(Box::new(E::int(0))),
                    end: Some(Box::new(E::int(3))),
                    step: None,
                },
                block: vec![Statement::Expression(E::call(
                    "play",
                    vec![E::ident("drive_frame"), E::call("ones", vec![duration])],
                ))],
            }),
        ],
    }]);
    let compiled = compile(program, DRIVE_SETUP);
    insta::assert_snapshot!("hd_duration_sweep", render(&compiled));
}
