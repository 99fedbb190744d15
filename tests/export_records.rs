use scanline::codec::Symbology;
use scanline::config;
use scanline::error::Error;
use scanline::export::{
    RecordSet, ReportSink, batch_records, export, html::HtmlSink, json::JsonSink, scan_records,
    sink_for_path, xlsx::XlsxSink,
};
use scanline::job::{ConversionJob, Outcome};
use scanline::report::BatchSummary;
use scanline::scan::ScanEvent;
use std::sync::Arc;
use time::OffsetDateTime;

fn event(format: Symbology, content: &str) -> ScanEvent {
    ScanEvent {
        timestamp: OffsetDateTime::UNIX_EPOCH,
        format,
        content: content.to_string(),
        raw_image: Arc::from(&b"\x89PNG\r\n\x1a\nfake"[..]),
        width: 640,
        height: 480,
    }
}

#[test]
fn empty_inputs_are_no_content() {
    assert!(matches!(scan_records(&[]), Err(Error::NoContent)));

    let summary = BatchSummary::from_jobs(&[]);
    assert!(matches!(batch_records(&summary), Err(Error::NoContent)));

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("empty.json");
    let err = export(&JsonSink, &RecordSet::Scan(Vec::new()), &dest).unwrap_err();
    assert!(matches!(err, Error::NoContent));
    assert!(!dest.exists());
}

#[test]
fn scan_records_keep_order_and_columns() {
    let events = vec![event(Symbology::QRCode, "first"), event(Symbology::Code128, "second")];
    let records = scan_records(&events).unwrap();

    assert_eq!(records.columns(), &["Time", "Type", "Content", "Width", "Height"]);
    let cells = records.cells();
    assert_eq!(
        cells[0],
        vec!["1970-01-01 00:00:00", "QRCode", "first", "640", "480"]
    );
    assert_eq!(cells[1][1], "Code128");
    assert!(records.image(0).is_some());
}

#[test]
fn batch_records_carry_reasons() {
    let mut ok = ConversionJob::from_text("fine");
    ok.settle(Outcome::Succeeded(vec![1]));
    let mut cancelled = ConversionJob::from_text("late");
    cancelled.settle(Outcome::Cancelled);
    let summary = BatchSummary::from_jobs(&[ok, cancelled]);

    let records = batch_records(&summary).unwrap();
    assert_eq!(records.columns(), &["Identifier", "Status", "Reason"]);
    let cells = records.cells();
    assert_eq!(cells[0], vec!["raw_text_input", "Succeeded", ""]);
    assert_eq!(cells[1][1], "Cancelled");
}

#[test]
fn html_escapes_content_and_inlines_frames() {
    let sink = HtmlSink::new(&config::Export::default());
    let records = scan_records(&[event(Symbology::QRCode, "<script>x</script>")]).unwrap();
    let page = sink.render(&records).unwrap();

    assert!(page.contains("&lt;script&gt;"));
    assert!(!page.contains("<script>x"));
    assert!(page.contains("src=\"data:image/png;base64,"));
    assert!(page.contains("<th>Image</th>"));
}

#[test]
fn html_without_images() {
    let cfg = config::Export {
        include_images: false,
        title: "Batch".into(),
    };
    let records = scan_records(&[event(Symbology::QRCode, "x")]).unwrap();
    let page = HtmlSink::new(&cfg).render(&records).unwrap();
    assert!(!page.contains("data:image"));
    assert!(page.contains("<title>Batch</title>"));
}

#[test]
fn json_and_xlsx_sinks_write_files() {
    let dir = tempfile::tempdir().unwrap();
    let records = scan_records(&[event(Symbology::QRCode, "hello")]).unwrap();

    let json_path = dir.path().join("nested/report.json");
    export(&JsonSink, &records, &json_path).unwrap();
    let doc: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
    assert_eq!(doc["records"][0]["content"], "hello");
    assert_eq!(doc["records"][0]["width"], 640);

    let cfg = config::Export {
        include_images: false,
        ..config::Export::default()
    };
    let xlsx_path = dir.path().join("report.xlsx");
    let sink = XlsxSink::new(&cfg);
    assert_eq!(sink.name(), "xlsx");
    export(&sink, &records, &xlsx_path).unwrap();
    let bytes = std::fs::read(&xlsx_path).unwrap();
    assert!(bytes.starts_with(b"PK"));
}

#[test]
fn sink_is_chosen_by_extension() {
    let cfg = config::Export::default();
    assert_eq!(sink_for_path("a.HTML".as_ref(), &cfg).unwrap().name(), "html");
    assert_eq!(sink_for_path("a.xlsx".as_ref(), &cfg).unwrap().name(), "xlsx");
    assert_eq!(sink_for_path("a.json".as_ref(), &cfg).unwrap().name(), "json");
    assert!(matches!(
        sink_for_path("a.csv".as_ref(), &cfg),
        Err(Error::InvalidConfig(_))
    ));
}

#[test]
fn sink_failure_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("taken");
    std::fs::create_dir(&dest).unwrap();
    let records = scan_records(&[event(Symbology::QRCode, "x")]).unwrap();

    match export(&JsonSink, &records, &dest) {
        Err(Error::ExportFailed { path, .. }) => assert_eq!(path, dest),
        other => panic!("expected ExportFailed, got {other:?}"),
    }
}
