// End-to-end compilation of a drive + readout experiment against a
// two-instrument setup loaded from JSON.

use std::collections::HashMap;

use pqc::ast::{
    AssignmentOperator, ClassicalType, Defcal, Expression as E, GateCall, IoKeyword, Measurement,
    Program, Statement, TimeUnit,
};
use pqc::awg::CoreType;
use pqc::diag::ErrorKind;
use pqc::pipeline::Compiler;
use pqc::setup::Setup;

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

fn setup() -> Setup {
    Setup::from_json(SETUP_JSON).unwrap()
}

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

/// Rabi-style experiment: scaled drive pulse, discriminated readout.
fn experiment() -> Program {
    Program::new(vec![
        Statement::IoDeclaration {
            io: IoKeyword::Input,
            ty: ClassicalType::Float { size: None },
            name: "amp".to_string(),
        },
        Statement::ConstantDeclaration {
            ty: ClassicalType::Int { size: None },
            name: "n_shots".to_string(),
            init: E::int(1024),
        },
        Statement::ConstantDeclaration {
            ty: ClassicalType::Int { size: None },
            name: "n_steps".to_string(),
            init: E::int(50),
        },
        Statement::ClassicalDeclaration {
            ty: ClassicalType::Bit { size: None },
            name: "b".to_string(),
            init: None,
        },
        Statement::Calibration {
            body: vec![
                port_decl("ch1"),
                port_decl("tx"),
                port_decl("rx"),
                frame_decl("drive_frame", "ch1", 5.0e9),
                frame_decl("tx_frame", "tx", 6.4e9),
                frame_decl("rx_frame", "rx", 6.4e9),
                Statement::Defcal(Defcal {
                    name: "x".to_string(),
                    args: vec![],
                    qubits: vec!["$0".to_string()],
                    return_type: None,
                    body: vec![Statement::Expression(E::call(
                        "play",
                        vec![
                            E::ident("drive_frame"),
                            E::binary(
                                pqc::ast::BinaryOperator::Times,
                                E::ident("amp"),
                                E::call("ones", vec![E::duration(24.0, TimeUnit::Ns)]),
                            ),
                        ],
                    ))],
                }),
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
        Statement::GateCall(GateCall {
            modifiers: vec![],
            name: "x".to_string(),
            args: vec![],
            qubits: vec![E::ident("$0")],
        }),
        Statement::Measurement(Measurement {
            qubit: E::ident("$0"),
            target: Some(E::ident("b")),
        }),
    ])
}

fn inputs() -> HashMap<String, serde_json::Value> {
    HashMap::from([("amp".to_string(), serde_json::json!(0.5))])
}

#[test]
fn drive_and_readout_compile_to_their_cores() {
    let compiled = Compiler::new(experiment(), setup())
        .inputs(inputs())
        .compile()
        .unwrap();
    assert_eq!(compiled.cores.len(), 2);

    let hd = &compiled.cores[&("hdawg1".to_string(), 1, CoreType::Hd)];
    assert_eq!(
        hd.seqc,
        "var amp = 0.5;\n\
         void _ZN1x_PN0_QN1__0_R() {\n\
         \x20 playWave(1, amp * ones(48));\n\
         }\n\
         _ZN1x_PN0_QN1__0_R();\n"
    );
    assert!(hd.settings.iter().any(|(path, _)| path == "/SIGOUTS/0/ON"));

    let qa = &compiled.cores[&("shfqa1".to_string(), 1, CoreType::Qa)];
    assert!(qa.seqc.contains("startQA(QA_GEN_0, QA_INT_0, true, 0x0, 0b0);"));
    assert!(qa.seqc.contains("b = _ZN7measure_PN0_QN1__0_RBIT();"));
    assert!(qa
        .settings
        .iter()
        .any(|(path, _)| path == "/QACHANNELS/0/READOUT/RESULT/SOURCE"));
}

#[test]
fn shot_counts_flow_into_the_signature() {
    let compiled = Compiler::new(experiment(), setup())
        .inputs(inputs())
        .compile()
        .unwrap();
    assert_eq!(compiled.signature.shots, 1024);
    assert_eq!(compiled.signature.steps, vec![50]);
}

#[test]
fn missing_input_fails_the_pipeline() {
    let err = Compiler::new(experiment(), setup()).compile().unwrap_err();
    assert_eq!(err.kind, ErrorKind::InputNotFound);
}

#[test]
fn recompilation_is_reproducible() {
    let a = Compiler::new(experiment(), setup())
        .inputs(inputs())
        .compile()
        .unwrap();
    let b = Compiler::new(experiment(), setup())
        .inputs(inputs())
        .compile()
        .unwrap();
    for (key, core) in &a.cores {
        assert_eq!(core.seqc, b.cores[key].seqc);
        assert_eq!(core.settings, b.cores[key].settings);
    }
    assert_eq!(a.provenance, b.provenance);
    assert_eq!(a.provenance.source_hash_hex().len(), 64);
}

#[test]
fn assignment_from_measure_func_reads_zsync_data() {
    let mut program = experiment();
    program.statements.push(Statement::Subroutine(pqc::ast::Subroutine {
        name: "measure_func".to_string(),
        params: vec![
            pqc::ast::TypedParam {
                ty: ClassicalType::Array {
                    base: Box::new(ClassicalType::Int { size: None }),
                    dims: vec![E::int(2)],
                },
                name: "qubits".to_string(),
            },
            pqc::ast::TypedParam {
                ty: ClassicalType::Int { size: None },
                name: "num".to_string(),
            },
        ],
        return_type: Some(ClassicalType::Bit { size: None }),
        body: vec![Statement::Return(Some(E::int(0)))],
    }));
    program.statements.push(Statement::ClassicalDeclaration {
        ty: ClassicalType::Array {
            base: Box::new(ClassicalType::Int { size: None }),
            dims: vec![E::int(2)],
        },
        name: "qs".to_string(),
        init: Some(E::ArrayLiteral(vec![
            E::ArrayLiteral(vec![E::int(0), E::int(0)]),
            E::ArrayLiteral(vec![E::int(1), E::int(1)]),
        ])),
    });
    program.statements.push(Statement::Assignment {
        lvalue: E::ident("b"),
        op: AssignmentOperator::Assign,
        rvalue: E::call("measure_func", vec![E::ident("qs"), E::int(2)]),
    });

    let compiled = Compiler::new(program, setup())
        .inputs(inputs())
        .compile()
        .unwrap();
    let qa = &compiled.cores[&("shfqa1".to_string(), 1, CoreType::Qa)];
    assert!(qa
        .seqc
        .contains("startQA(QA_GEN_0 | QA_GEN_1, QA_INT_0 | QA_INT_1, true, 0x0, 0b0);"));
    assert!(qa.seqc.contains("b = getZSyncData(ZSYNC_DATA_RAW);"));
}
