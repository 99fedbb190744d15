use super::{ReportSink, RecordSet, failed};
use crate::config;
use crate::error::Result;
use rust_xlsxwriter::{Format, Image, Workbook};
use std::path::Path;
use tracing::warn;

const IMAGE_ROW_HEIGHT: f64 = 80.0;
const IMAGE_COLUMN_WIDTH: f64 = 16.0;

/// One-sheet workbook. Scan frames go into an extra first column.
pub struct XlsxSink {
    include_images: bool,
}

impl XlsxSink {
    pub fn new(cfg: &config::Export) -> Self {
        Self {
            include_images: cfg.include_images,
        }
    }
}

impl ReportSink for XlsxSink {
    fn name(&self) -> &'static str {
        "xlsx"
    }

    fn write(&self, records: &RecordSet, dest: &Path) -> Result<()> {
        let with_images = self.include_images && matches!(records, RecordSet::Scan(_));
        let offset: u16 = if with_images { 1 } else { 0 };
        let header = Format::new().set_bold();

        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        let sheet_name = match records {
            RecordSet::Scan(_) => "Scans",
            RecordSet::Batch(_) => "Batch",
        };
        sheet.set_name(sheet_name).map_err(|e| failed(dest, e))?;

        if with_images {
            sheet
                .write_string_with_format(0, 0, "Image", &header)
                .map_err(|e| failed(dest, e))?;
            sheet
                .set_column_width(0, IMAGE_COLUMN_WIDTH)
                .map_err(|e| failed(dest, e))?;
        }
        for (c, name) in records.columns().iter().enumerate() {
            sheet
                .write_string_with_format(0, c as u16 + offset, *name, &header)
                .map_err(|e| failed(dest, e))?;
        }

        for (i, cells) in records.cells().into_iter().enumerate() {
            let row = i as u32 + 1;
            for (c, cell) in cells.iter().enumerate() {
                let col = c as u16 + offset;
                match records {
                    // Width and height stay numeric.
                    RecordSet::Scan(r) if c == 3 => sheet.write_number(row, col, r[i].width as f64),
                    RecordSet::Scan(r) if c == 4 => sheet.write_number(row, col, r[i].height as f64),
                    _ => sheet.write_string(row, col, cell),
                }
                .map_err(|e| failed(dest, e))?;
            }

            if !with_images {
                continue;
            }
            let Some(bytes) = records.image(i) else { continue };
            match Image::new_from_buffer(bytes) {
                Ok(image) => {
                    sheet
                        .set_row_height(row, IMAGE_ROW_HEIGHT)
                        .map_err(|e| failed(dest, e))?;
                    sheet
                        .insert_image_fit_to_cell(row, 0, &image, true)
                        .map_err(|e| failed(dest, e))?;
                }
                Err(e) => {
                    warn!(row, error = %e, "frame not embeddable");
                    sheet
                        .write_string(row, 0, "[image unavailable]")
                        .map_err(|e| failed(dest, e))?;
                }
            }
        }

        sheet.autofit();
        if with_images {
            sheet
                .set_column_width(0, IMAGE_COLUMN_WIDTH)
                .map_err(|e| failed(dest, e))?;
        }

        workbook.save(dest).map_err(|e| failed(dest, e))
    }
}
