mod common;

use common::FakeCodec;
use scanline::classify::{UNDETERMINED_NOTE, classify};
use scanline::codec::Symbology;
use scanline::error::{CodecFailure, Error};
use scanline::export::batch_records;
use scanline::job::{ConversionJob, FailureKind, Intent, JobStatus, Payload, SourceRef};
use scanline::pipeline::{BatchSettings, CancelToken, Pipeline};
use scanline::units::{Dimensions, SizeUnit};
use std::sync::Arc;
use std::time::Duration;

fn inline_job(name: &str, intent: Intent, payload: &[u8]) -> ConversionJob {
    ConversionJob::new(
        SourceRef::File(name.into()),
        intent,
        Payload::Inline(payload.to_vec()),
    )
}

#[test]
fn three_job_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let photo = dir.path().join("photo.png");
    std::fs::write(&photo, b"just a holiday picture").unwrap();

    let codec = Arc::new(FakeCodec::default());
    let pipeline = Pipeline::new(Arc::clone(&codec), BatchSettings::default());

    let mut jobs = vec![
        ConversionJob::from_text("hello world"),
        ConversionJob::from_file(&photo, Intent::Decode),
        inline_job("maxi.txt", Intent::Generate, b"payload").with_format(Symbology::MaxiCode),
    ];
    let summary = pipeline.run(&mut jobs, &CancelToken::default()).unwrap();

    assert_eq!(summary.total, 3);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.cancelled, 0);
    assert!(summary.is_consistent());

    assert_eq!(summary.failures.len(), 2);
    assert_eq!(
        summary.failures[0].reason.kind,
        FailureKind::Codec(CodecFailure::NotRecognized)
    );
    assert_eq!(summary.failures[0].identifier, photo.display().to_string());
    assert_eq!(summary.failures[1].reason.kind, FailureKind::UnsupportedOperation);
    assert_eq!(summary.failures[1].identifier, "maxi.txt");

    assert_eq!(jobs[0].status(), JobStatus::Succeeded);
    assert!(jobs[0].result_bytes().unwrap().ends_with(b"hello world"));
    assert!(jobs[1].result_bytes().is_none());
    assert_eq!(codec.generates(), 1);
    assert_eq!(codec.decodes(), 1);
}

#[test]
fn read_only_format_never_reaches_codec() {
    let codec = Arc::new(FakeCodec::default());
    let pipeline = Pipeline::new(Arc::clone(&codec), BatchSettings::default());

    let mut jobs: Vec<_> = Symbology::default_read_only()
        .into_iter()
        .map(|f| ConversionJob::from_text("data").with_format(f))
        .collect();
    let summary = pipeline.run(&mut jobs, &CancelToken::default()).unwrap();

    assert_eq!(summary.failed, jobs.len());
    assert!(
        summary
            .failures
            .iter()
            .all(|f| f.reason.kind == FailureKind::UnsupportedOperation)
    );
    assert_eq!(codec.generates(), 0);
    assert_eq!(codec.decodes(), 0);
}

#[test]
fn empty_batch_is_rejected() {
    let pipeline = Pipeline::new(FakeCodec::default(), BatchSettings::default());
    let err = pipeline.run(&mut [], &CancelToken::default()).unwrap_err();
    assert!(matches!(err, Error::NoInputSelected));
}

#[test]
fn bad_dimensions_abort_before_any_job() {
    let codec = Arc::new(FakeCodec::default());
    let pipeline = Pipeline::new(Arc::clone(&codec), BatchSettings::default());
    let bad = Dimensions {
        width: 5.0,
        height: 5.0,
        unit: SizeUnit::Physical,
        resolution: 0.0,
    };
    let mut jobs = vec![
        ConversionJob::from_text("first"),
        ConversionJob::from_text("second").with_dimensions(bad),
    ];

    let err = pipeline.run(&mut jobs, &CancelToken::default()).unwrap_err();
    assert!(matches!(err, Error::InvalidConfig(_)));
    assert_eq!(codec.generates(), 0);
    assert!(jobs.iter().all(|j| j.status() == JobStatus::Pending));
}

#[test]
fn physical_size_reaches_codec_in_pixels() {
    let pipeline = Pipeline::new(FakeCodec::default(), BatchSettings::default());
    let dims = Dimensions {
        width: 2.54,
        height: 5.08,
        unit: SizeUnit::Physical,
        resolution: 300.0,
    };
    let mut jobs = vec![ConversionJob::from_text("sized").with_dimensions(dims)];
    pipeline.run(&mut jobs, &CancelToken::default()).unwrap();

    let out = jobs[0].result_bytes().unwrap();
    assert!(out.starts_with(b"QRCode:300x600:"));
}

#[test]
fn failure_order_follows_input_under_concurrency() {
    let codec = Arc::new(FakeCodec::slow(Duration::from_millis(5)));
    let settings = BatchSettings {
        workers: 4,
        ..BatchSettings::default()
    };
    let pipeline = Pipeline::new(Arc::clone(&codec), settings);

    let mut jobs: Vec<_> = (0..16)
        .map(|i| {
            let payload = if i % 3 == 0 {
                format!("bad-{i}")
            } else {
                format!("ok-{i}")
            };
            inline_job(&format!("job-{i:02}.txt"), Intent::Generate, payload.as_bytes())
        })
        .collect();
    let summary = pipeline.run(&mut jobs, &CancelToken::default()).unwrap();

    let expected: Vec<String> = (0..16)
        .filter(|i| i % 3 == 0)
        .map(|i| format!("job-{i:02}.txt"))
        .collect();
    let got: Vec<String> = summary.failures.iter().map(|f| f.identifier.clone()).collect();
    assert_eq!(got, expected);
    assert_eq!(summary.succeeded + summary.failed, summary.total);

    let order: Vec<String> = summary.entries.iter().map(|e| e.identifier.clone()).collect();
    let input: Vec<String> = jobs.iter().map(|j| j.identifier()).collect();
    assert_eq!(order, input);
}

#[test]
fn undetermined_runs_as_generate_with_note() {
    let codec = Arc::new(FakeCodec::default());
    let pipeline = Pipeline::new(Arc::clone(&codec), BatchSettings::default());
    let mut jobs = vec![inline_job("mystery.bin", Intent::Undetermined, b"\x01\x02")];

    let summary = pipeline.run(&mut jobs, &CancelToken::default()).unwrap();
    assert_eq!(summary.succeeded, 1);
    assert_eq!(codec.generates(), 1);
    assert_eq!(jobs[0].annotation(), Some(UNDETERMINED_NOTE));
    assert_eq!(summary.entries[0].annotation.as_deref(), Some(UNDETERMINED_NOTE));
}

#[test]
fn override_discards_undetermined() {
    let codec = Arc::new(FakeCodec::default());
    let pipeline = Pipeline::new(Arc::clone(&codec), BatchSettings::default());
    let mut job = inline_job("mystery.bin", Intent::Undetermined, b"BARCODE:abc");
    job.override_intent(scanline::job::Action::Decode);
    let mut jobs = vec![job];

    let summary = pipeline.run(&mut jobs, &CancelToken::default()).unwrap();
    assert_eq!(summary.succeeded, 1);
    assert_eq!(codec.decodes(), 1);
    assert_eq!(codec.generates(), 0);
    assert_eq!(jobs[0].annotation(), None);
    assert_eq!(jobs[0].result_bytes(), Some(&b"abc"[..]));
}

#[test]
fn missing_file_fails_only_that_job() {
    let pipeline = Pipeline::new(FakeCodec::default(), BatchSettings::default());
    let mut jobs = vec![
        ConversionJob::from_file("/definitely/not/here.png", Intent::Decode),
        ConversionJob::from_text("still runs"),
    ];
    let summary = pipeline.run(&mut jobs, &CancelToken::default()).unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(
        summary.failures[0].reason.kind,
        FailureKind::Codec(CodecFailure::InvalidImage)
    );
}

#[test]
fn cancelled_before_start_marks_every_job_cancelled() {
    let codec = Arc::new(FakeCodec::default());
    let pipeline = Pipeline::new(Arc::clone(&codec), BatchSettings::default());
    let mut jobs = vec![
        ConversionJob::from_text("a"),
        ConversionJob::from_text("b"),
    ];
    let cancel = CancelToken::default();
    cancel.cancel();

    let summary = pipeline.run(&mut jobs, &cancel).unwrap();
    assert_eq!(summary.cancelled, 2);
    assert_eq!(summary.failed, 0);
    assert!(summary.failures.is_empty());
    assert!(summary.is_consistent());
    assert!(jobs.iter().all(|j| j.status() == JobStatus::Cancelled));
    assert_eq!(codec.generates(), 0);
}

#[test]
fn spawned_batch_reports_progress() {
    let pipeline = Pipeline::new(FakeCodec::default(), BatchSettings::default());
    let jobs = vec![
        ConversionJob::from_text("one"),
        ConversionJob::from_text("two"),
        ConversionJob::from_text("three"),
    ];
    let handle = pipeline.spawn(jobs);

    let updates: Vec<_> = handle.progress().iter().collect();
    let result = handle.join().unwrap();

    assert_eq!(updates.len(), 3);
    assert_eq!(updates.last().unwrap().completed, 3);
    assert_eq!(result.summary.total, 3);
    assert_eq!(result.summary.succeeded, 3);
    assert_eq!(result.jobs.len(), 3);
}

#[test]
fn settle_happens_once() {
    let mut job = ConversionJob::from_text("x");
    assert!(job.settle(scanline::job::Outcome::Succeeded(vec![1])));
    assert!(!job.settle(scanline::job::Outcome::Cancelled));
    assert_eq!(job.status(), JobStatus::Succeeded);
}

#[test]
fn override_clears_classifier_note() {
    let dir = tempfile::tempdir().unwrap();
    let blob = dir.path().join("blob.bin");
    std::fs::write(&blob, [0x00, 0x01, 0xfe, 0xff, 0x00]).unwrap();

    let verdict = classify(&SourceRef::File(blob.clone()));
    assert_eq!(verdict.intent, Intent::Undetermined);
    let mut job = ConversionJob::from_file(&blob, verdict.intent);
    job.annotate(verdict.note.unwrap());
    job.override_intent(scanline::job::Action::Generate);
    assert_eq!(job.annotation(), None);

    let pipeline = Pipeline::new(FakeCodec::default(), BatchSettings::default());
    let mut jobs = vec![job];
    let summary = pipeline.run(&mut jobs, &CancelToken::default()).unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.entries[0].annotation, None);
    let cells = batch_records(&summary).unwrap().cells();
    assert_eq!(cells[0][2], "");
}

#[test]
fn override_keeps_unrelated_annotation() {
    let mut job = inline_job("scan.dat", Intent::Decode, b"x");
    job.annotate("recognised image signature");
    job.override_intent(scanline::job::Action::Generate);
    assert_eq!(job.annotation(), Some("recognised image signature"));
}

#[test]
fn cancel_mid_run_keeps_finished_jobs() {
    let codec = Arc::new(FakeCodec::slow(Duration::from_millis(50)));
    let pipeline = Pipeline::new(Arc::clone(&codec), BatchSettings::default());
    let jobs: Vec<_> = (0..6)
        .map(|i| inline_job(&format!("job-{i}.txt"), Intent::Generate, format!("ok-{i}").as_bytes()))
        .collect();
    let handle = pipeline.spawn(jobs);

    let first = handle.progress().recv().unwrap();
    assert_eq!(first.status, JobStatus::Succeeded);
    handle.cancel();
    let rest: Vec<_> = handle.progress().iter().collect();
    let result = handle.join().unwrap();
    let summary = result.summary;

    assert_eq!(rest.len() + 1, 6);
    assert!(summary.is_consistent());
    assert!(summary.succeeded >= 1);
    assert!(summary.cancelled >= 1);
    assert_eq!(summary.failed, 0);
    assert!(codec.generates() < 6);

    let statuses: Vec<JobStatus> = result.jobs.iter().map(|j| j.status()).collect();
    assert_eq!(statuses[0], JobStatus::Succeeded);
    assert_eq!(statuses[5], JobStatus::Cancelled);
    // Finished jobs form a prefix; everything after the cancel point is Cancelled.
    let split = statuses.iter().position(|s| *s == JobStatus::Cancelled).unwrap();
    assert!(statuses[..split].iter().all(|s| *s == JobStatus::Succeeded));
    assert!(statuses[split..].iter().all(|s| *s == JobStatus::Cancelled));
    assert!(result.jobs[split].result_bytes().is_none());
}
