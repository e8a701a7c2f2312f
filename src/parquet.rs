// Parquet encoding and decoding
//
// Output files are snappy-compressed with dictionary encoding, the format the
// warehouse's external tables read.

use arrow::array::RecordBatch;
use arrow::datatypes::SchemaRef;
use bytes::Bytes;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::{EnabledStatistics, WriterProperties};
use std::sync::OnceLock;

use crate::error::{DwhError, Result};

/// File suffix for snappy-compressed Parquet output.
pub const SNAPPY_PARQUET_SUFFIX: &str = ".snappy.parquet";

pub fn writer_properties() -> &'static WriterProperties {
    static PROPERTIES: OnceLock<WriterProperties> = OnceLock::new();
    PROPERTIES.get_or_init(|| {
        WriterProperties::builder()
            .set_dictionary_enabled(true)
            .set_statistics_enabled(EnabledStatistics::Page)
            .set_compression(Compression::SNAPPY)
            .set_data_page_size_limit(256 * 1024) // 256 KiB data pages
            .set_max_row_group_size(32 * 1024) // 32k rows per group
            .build()
    })
}

/// Encode batches sharing `schema` into one in-memory Parquet file.
pub fn encode_batches(schema: SchemaRef, batches: &[RecordBatch]) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let props = writer_properties().clone();
    let mut writer = ArrowWriter::try_new(&mut buffer, schema, Some(props))?;

    for batch in batches {
        writer.write(batch)?;
    }
    writer.close()?;

    Ok(buffer)
}

/// Decode a whole Parquet file held in memory.
pub fn decode_batches(data: Bytes) -> Result<(SchemaRef, Vec<RecordBatch>)> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(data)?;
    let schema = builder.schema().clone();
    let reader = builder.build()?;

    let batches = reader
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| DwhError::codec(format!("Failed to decode Parquet batch: {}", e)))?;

    Ok((schema, batches))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int32Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use parquet::file::reader::{FileReader, SerializedFileReader};
    use std::sync::Arc;

    fn batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("aboard", DataType::Int32, true),
            Field::new("operator", DataType::Utf8, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int32Array::from(vec![Some(4), None, Some(12)])),
                Arc::new(StringArray::from(vec![Some("Military - U.S. Army"), Some("KLM"), None])),
            ],
        )
        .unwrap()
    }

    #[test]
    fn encoded_file_is_snappy_parquet() {
        let batch = batch();
        let bytes = encode_batches(batch.schema(), &[batch]).unwrap();
        assert_eq!(&bytes[0..4], b"PAR1");

        let reader = SerializedFileReader::new(Bytes::from(bytes)).unwrap();
        let column = reader.metadata().row_group(0).column(0);
        assert_eq!(column.compression(), Compression::SNAPPY);
    }

    #[test]
    fn decode_returns_every_row() {
        let batch = batch();
        let bytes = encode_batches(batch.schema(), &[batch.clone(), batch]).unwrap();
        let (schema, batches) = decode_batches(Bytes::from(bytes)).unwrap();
        assert_eq!(schema.fields().len(), 2);
        assert_eq!(batches.iter().map(|b| b.num_rows()).sum::<usize>(), 6);
    }

    #[test]
    fn decode_rejects_garbage() {
        let err = decode_batches(Bytes::from_static(b"not parquet")).unwrap_err();
        assert_eq!(err.code(), "E005");
    }
}
