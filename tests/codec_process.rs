use scanline::codec::{Codec, Symbology, process::ProcessCodec};
use scanline::config::Config;
use scanline::error::{CodecFailure, Error};
use std::collections::BTreeSet;

fn missing_program() -> Config {
    let mut cfg = Config::default();
    cfg.codec.program = "scanline-codec-that-does-not-exist".into();
    cfg
}

#[test]
fn empty_program_is_invalid_config() {
    let mut cfg = Config::default();
    cfg.codec.program = "  ".into();
    assert!(matches!(ProcessCodec::new(&cfg), Err(Error::InvalidConfig(_))));
}

#[test]
fn doctor_reports_missing_tool_without_failing() {
    let codec = ProcessCodec::new(&missing_program()).unwrap();
    let diag = codec.doctor().unwrap();
    assert!(!diag.ok);
    assert!(diag.error.is_some());
}

#[test]
fn empty_inputs_are_rejected_before_spawning() {
    let codec = ProcessCodec::new(&missing_program()).unwrap();

    let err = codec.generate(b"", Symbology::QRCode, 10, 10, true).unwrap_err();
    assert!(matches!(
        err,
        Error::Codec { failure: CodecFailure::InvalidPayload, .. }
    ));

    let err = codec.decode(b"", &BTreeSet::new(), false).unwrap_err();
    assert!(matches!(
        err,
        Error::Codec { failure: CodecFailure::InvalidImage, .. }
    ));
}

#[test]
fn spawn_failure_is_internal_error() {
    let codec = ProcessCodec::new(&missing_program()).unwrap();
    let err = codec.decode(b"image", &BTreeSet::new(), false).unwrap_err();
    assert!(matches!(
        err,
        Error::Codec { failure: CodecFailure::InternalError, .. }
    ));
}

#[test]
fn symbology_names_round_trip_case_insensitively() {
    assert_eq!("qrcode".parse::<Symbology>().unwrap(), Symbology::QRCode);
    assert_eq!(" EAN13 ".parse::<Symbology>().unwrap(), Symbology::EAN13);
    assert!("Hieroglyph".parse::<Symbology>().is_err());
    assert_eq!(Symbology::all().len(), 20);
    assert!(Symbology::default_read_only().contains(&Symbology::DXFilmEdge));
    assert!(!Symbology::default_read_only().contains(&Symbology::QRCode));
}

#[test]
fn hung_codec_is_killed_after_timeout() {
    let mut cfg = Config::default();
    cfg.codec.program = "sh".into();
    cfg.codec.args = vec!["-c".into(), "echo partial; exec sleep 30".into()];
    cfg.codec.timeout_seconds = 1;
    let codec = ProcessCodec::new(&cfg).unwrap();

    let started = std::time::Instant::now();
    let err = codec.decode(b"image", &BTreeSet::new(), false).unwrap_err();
    assert!(started.elapsed() < std::time::Duration::from_secs(10));
    match err {
        Error::Codec {
            failure: CodecFailure::InternalError,
            detail: Some(detail),
        } => assert!(detail.contains("timeout")),
        other => panic!("expected a timeout, got {other:?}"),
    }
}
