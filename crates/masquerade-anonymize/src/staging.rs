use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use csv::{QuoteStyle, Terminator, Writer, WriterBuilder};
use tempfile::NamedTempFile;

use masquerade_core::{Error, Result, SqlValue};

use crate::driver::{FIELD_DELIMITER, StagingFormat};

/// Delimited file holding the rows of one bulk load.
///
/// Values are always quoted and NULL is the format's bare marker, so the two
/// never collide. The file is removed when the handle is dropped, whether or
/// not the load ran.
pub struct StagingFile {
    entity: String,
    format: StagingFormat,
    writer: Writer<BufWriter<File>>,
    file: NamedTempFile,
    rows: u64,
    hex_columns: Vec<bool>,
}

impl StagingFile {
    /// Create an empty staging file in `dir`, or the system temp directory.
    ///
    /// Files read by the server are created world-readable; the directory
    /// must still be reachable by the server's service account.
    pub fn create(entity: &str, dir: Option<&Path>, format: StagingFormat) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("masquerade-").suffix(".csv");
        let file = match dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(|err| Error::bulk_load(entity, format!("cannot create staging file: {err}")))?;
        if format.shared_read {
            share_read(&file).map_err(|err| {
                Error::bulk_load(entity, format!("cannot share staging file: {err}"))
            })?;
        }
        let handle = file
            .reopen()
            .map_err(|err| Error::bulk_load(entity, format!("cannot open staging file: {err}")))?;
        let writer = WriterBuilder::new()
            .delimiter(FIELD_DELIMITER)
            .quote_style(QuoteStyle::Never)
            .terminator(Terminator::Any(b'\n'))
            .from_writer(BufWriter::new(handle));
        Ok(Self {
            entity: entity.to_string(),
            format,
            writer,
            file,
            rows: 0,
            hex_columns: Vec::new(),
        })
    }

    /// Write the cells of the flagged columns as the hex of their bytes.
    pub fn with_hex_columns(mut self, hex_columns: Vec<bool>) -> Self {
        self.hex_columns = hex_columns;
        self
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn write_row(&mut self, values: &[SqlValue]) -> Result<()> {
        let fields: Vec<String> = values
            .iter()
            .enumerate()
            .map(|(index, value)| {
                if self.hex_columns.get(index).copied().unwrap_or(false) {
                    self.hex_field(value)
                } else {
                    self.field(value)
                }
            })
            .collect();
        self.writer
            .write_record(&fields)
            .map_err(|err| Error::bulk_load(&self.entity, format!("cannot stage row: {err}")))?;
        self.rows += 1;
        Ok(())
    }

    /// Flush buffered rows; the file is complete once this returns.
    pub fn finish(&mut self) -> Result<PathBuf> {
        self.writer
            .flush()
            .map_err(|err| Error::bulk_load(&self.entity, format!("cannot flush staging file: {err}")))?;
        Ok(self.file.path().to_path_buf())
    }

    fn field(&self, value: &SqlValue) -> String {
        match value.to_plain_string() {
            None => self.format.null_marker.to_string(),
            Some(text) => {
                let text = if self.format.escape_backslashes {
                    text.replace('\\', "\\\\")
                } else {
                    text
                };
                format!("\"{}\"", text.replace('"', "\"\""))
            }
        }
    }

    fn hex_field(&self, value: &SqlValue) -> String {
        let encoded = match value {
            SqlValue::Null => return self.format.null_marker.to_string(),
            SqlValue::Bytes(bytes) => hex::encode(bytes),
            SqlValue::Bool(flag) => hex::encode([u8::from(*flag)]),
            other => hex::encode(other.to_plain_string().unwrap_or_default()),
        };
        format!("\"{encoded}\"")
    }
}

#[cfg(unix)]
fn share_read(file: &NamedTempFile) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.as_file()
        .set_permissions(std::fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn share_read(_file: &NamedTempFile) -> std::io::Result<()> {
    Ok(())
}
