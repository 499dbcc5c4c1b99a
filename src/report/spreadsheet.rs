//! Excel workbook with the measurements and summary sheets

use crate::corpus::CorpusTable;
use crate::stats::SummaryStatistics;
use crate::{Error, Result};
use arrow::array::{Array, Float64Array, Int32Array, UInt32Array};
use arrow::datatypes::DataType;
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
use std::path::Path;

/// Sheet holding one row per particle
pub const MEASUREMENTS_SHEET: &str = "measurements";
/// Sheet holding the summary statistics row
pub const SUMMARY_SHEET: &str = "summary";

fn xlsx_err(e: XlsxError) -> Error {
    Error::Spreadsheet(e.to_string())
}

/// Write both sheets to `path`, replacing any existing workbook
///
/// # Errors
/// Returns `Error::Spreadsheet` if a cell cannot be written or the file saved
pub fn write_workbook(path: &Path, corpus: &CorpusTable, summary: &SummaryStatistics) -> Result<()> {
    let header = Format::new().set_bold();
    let mut workbook = Workbook::new();

    let measurements = workbook.add_worksheet();
    measurements.set_name(MEASUREMENTS_SHEET).map_err(xlsx_err)?;
    write_measurements(measurements, corpus, &header)?;

    let sheet = workbook.add_worksheet();
    sheet.set_name(SUMMARY_SHEET).map_err(xlsx_err)?;
    write_summary(sheet, summary, &header)?;

    workbook.save(path).map_err(xlsx_err)?;
    Ok(())
}

fn write_measurements(sheet: &mut Worksheet, corpus: &CorpusTable, header: &Format) -> Result<()> {
    let batch = corpus.batch();
    let schema = batch.schema();

    for (col, field) in schema.fields().iter().enumerate() {
        let col = u16::try_from(col)
            .map_err(|_| Error::Spreadsheet("too many columns for a worksheet".to_string()))?;
        sheet
            .write_string_with_format(0, col, field.name(), header)
            .map_err(xlsx_err)?;

        let column = batch.column(usize::from(col));
        for row in 0..batch.num_rows() {
            if column.is_null(row) {
                continue;
            }
            let value = match field.data_type() {
                DataType::Float64 => downcast::<Float64Array>(column.as_ref())?.value(row),
                DataType::UInt32 => f64::from(downcast::<UInt32Array>(column.as_ref())?.value(row)),
                DataType::Int32 => f64::from(downcast::<Int32Array>(column.as_ref())?.value(row)),
                dt => {
                    return Err(Error::Spreadsheet(format!(
                        "unsupported column type {dt:?} for '{}'",
                        field.name()
                    )))
                }
            };
            let excel_row = u32::try_from(row + 1)
                .map_err(|_| Error::Spreadsheet("too many rows for a worksheet".to_string()))?;
            sheet.write_number(excel_row, col, value).map_err(xlsx_err)?;
        }
    }
    Ok(())
}

fn write_summary(sheet: &mut Worksheet, summary: &SummaryStatistics, header: &Format) -> Result<()> {
    let cells = [
        ("Mean Feret's diameter".to_string(), Some(summary.mean)),
        ("Standard Deviation".to_string(), summary.standard_deviation),
        ("Min".to_string(), Some(summary.min)),
        ("Max".to_string(), Some(summary.max)),
        (summary.threshold_label(), Some(summary.percent_under_threshold)),
    ];

    for (col, (title, value)) in (0u16..).zip(cells) {
        sheet
            .write_string_with_format(0, col, title, header)
            .map_err(xlsx_err)?;
        if let Some(value) = value {
            sheet.write_number(1, col, value).map_err(xlsx_err)?;
        }
    }
    Ok(())
}

fn downcast<T: Array + 'static>(column: &dyn Array) -> Result<&T> {
    column
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| Error::Other("Failed to downcast corpus column".to_string()))
}
