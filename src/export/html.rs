use super::{ReportSink, RecordSet, failed};
use crate::config;
use crate::error::Result;
use crate::capture::image_extension;
use crate::util::now_rfc3339;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::Serialize;
use std::path::Path;
use tera::{Context, Tera};

const TEMPLATE_NAME: &str = "report.html";

const TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{{ title }}</title>
<style>
body { font-family: sans-serif; margin: 2em; }
table { border-collapse: collapse; width: 100%; }
th, td { border: 1px solid #ccc; padding: 6px 10px; text-align: left; vertical-align: top; }
th { background: #f0f0f0; }
td.content { word-break: break-all; }
img { max-width: 160px; max-height: 160px; }
</style>
</head>
<body>
<h1>{{ title }}</h1>
<p>Generated {{ generated_at }} &middot; {{ rows | length }} record(s)</p>
<table>
<thead><tr>{% if with_images %}<th>Image</th>{% endif %}{% for c in columns %}<th>{{ c }}</th>{% endfor %}</tr></thead>
<tbody>
{% for row in rows %}<tr>{% if with_images %}<td>{% if row.image %}<img src="{{ row.image | safe }}">{% endif %}</td>{% endif %}{% for cell in row.cells %}<td{% if loop.index == content_column %} class="content"{% endif %}>{{ cell }}</td>{% endfor %}</tr>
{% endfor %}</tbody>
</table>
</body>
</html>
"#;

#[derive(Serialize)]
struct Row {
    image: Option<String>,
    cells: Vec<String>,
}

/// Single self-contained HTML page; frames are inlined as data URIs.
pub struct HtmlSink {
    title: String,
    include_images: bool,
}

impl HtmlSink {
    pub fn new(cfg: &config::Export) -> Self {
        Self {
            title: cfg.title.clone(),
            include_images: cfg.include_images,
        }
    }

    pub fn render(&self, records: &RecordSet) -> Result<String> {
        self.render_page(records)
            .map_err(|e| failed(Path::new(TEMPLATE_NAME), e))
    }

    fn render_page(&self, records: &RecordSet) -> tera::Result<String> {
        let with_images = self.include_images && matches!(records, RecordSet::Scan(_));
        let rows: Vec<Row> = records
            .cells()
            .into_iter()
            .enumerate()
            .map(|(i, cells)| Row {
                image: with_images
                    .then(|| records.image(i).map(data_uri))
                    .flatten(),
                cells,
            })
            .collect();

        let mut tera = Tera::default();
        tera.add_raw_template(TEMPLATE_NAME, TEMPLATE)?;

        let mut ctx = Context::new();
        ctx.insert("title", &self.title);
        ctx.insert("generated_at", &now_rfc3339());
        ctx.insert("columns", records.columns());
        ctx.insert("rows", &rows);
        ctx.insert("with_images", &with_images);
        ctx.insert(
            "content_column",
            &records.columns().iter().position(|c| *c == "Content").map(|i| i + 1),
        );

        tera.render(TEMPLATE_NAME, &ctx)
    }
}

impl ReportSink for HtmlSink {
    fn name(&self) -> &'static str {
        "html"
    }

    fn write(&self, records: &RecordSet, dest: &Path) -> Result<()> {
        let page = self.render_page(records).map_err(|e| failed(dest, e))?;
        std::fs::write(dest, page).map_err(|e| failed(dest, e))
    }
}

fn data_uri(bytes: &[u8]) -> String {
    let mime = match image_extension(bytes) {
        "jpg" => "image/jpeg",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        "tiff" => "image/tiff",
        "png" => "image/png",
        _ => "application/octet-stream",
    };
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}
