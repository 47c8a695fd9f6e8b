//! Result sinks for sweep output.

use std::fs::File;
use std::path::Path;

use tracing::info;

use sweep::{HardwareResult, Measurement, ResultSink};

/// Streams records to a CSV file with a fixed column layout.
///
/// Columns are declared up front so every row lines up even if a record
/// is missing a channel (written as `NaN`). Each record is flushed as it
/// arrives; a sweep that dies mid-run keeps everything measured so far.
pub struct CsvSink {
    writer: csv::Writer<File>,
    columns: Vec<String>,
}

impl CsvSink {
    /// Create the file, write the header, and flush it.
    pub fn create(path: &Path, columns: &[&str]) -> csv::Result<Self> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(columns)?;
        writer.flush()?;
        Ok(Self {
            writer,
            columns: columns.iter().map(|s| s.to_string()).collect(),
        })
    }
}

impl ResultSink for CsvSink {
    fn emit(&mut self, measurement: Measurement) -> HardwareResult<()> {
        let row: Vec<String> = self
            .columns
            .iter()
            .map(|column| {
                measurement
                    .get(column)
                    .map(|value| value.to_string())
                    .unwrap_or_else(|| "NaN".to_string())
            })
            .collect();
        self.writer.write_record(&row)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Logs each record through `tracing`.
pub struct LogSink;

impl ResultSink for LogSink {
    fn emit(&mut self, measurement: Measurement) -> HardwareResult<()> {
        let summary: Vec<String> = measurement
            .channels
            .iter()
            .map(|(name, value)| format!("{name}={value:.6e}"))
            .collect();
        info!(setpoint = measurement.setpoint, "{}", summary.join(", "));
        Ok(())
    }
}

/// Fans each record out to two sinks, in order.
pub struct TeeSink<A, B>(pub A, pub B);

impl<A: ResultSink, B: ResultSink> ResultSink for TeeSink<A, B> {
    fn emit(&mut self, measurement: Measurement) -> HardwareResult<()> {
        self.0.emit(measurement.clone())?;
        self.1.emit(measurement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(setpoint: f64, voltage: f64) -> Measurement {
        let mut m = Measurement::new(setpoint);
        m.insert("Magnetic Field (T)", setpoint);
        m.insert("Voltage (V)", voltage);
        m
    }

    #[test]
    fn csv_sink_writes_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        {
            let mut sink =
                CsvSink::create(&path, &["Magnetic Field (T)", "Voltage (V)"]).unwrap();
            sink.emit(record(0.1, 2.0e-5)).unwrap();
            sink.emit(record(0.2, 3.0e-5)).unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "Magnetic Field (T),Voltage (V)");
        assert_eq!(lines[1], "0.1,0.00002");
        assert_eq!(lines[2], "0.2,0.00003");
    }

    #[test]
    fn csv_sink_fills_missing_channels_with_nan() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        {
            let mut sink =
                CsvSink::create(&path, &["Voltage (V)", "Resistance (ohm)"]).unwrap();
            let mut m = Measurement::new(0.0);
            m.insert("Voltage (V)", 1.0);
            sink.emit(m).unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().nth(1).unwrap(), "1,NaN");
    }

    #[test]
    fn log_sink_formats_every_channel() {
        use std::sync::{Arc, Mutex};
        use tracing_subscriber::fmt::MakeWriter;

        #[derive(Clone, Default)]
        struct Capture(Arc<Mutex<Vec<u8>>>);

        impl std::io::Write for Capture {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        impl<'a> MakeWriter<'a> for Capture {
            type Writer = Capture;
            fn make_writer(&'a self) -> Self::Writer {
                self.clone()
            }
        }

        let capture = Capture::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(capture.clone())
            .with_ansi(false)
            .without_time()
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            LogSink.emit(record(0.1, 2.0e-5)).unwrap();
        });

        let output = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("Magnetic Field (T)=1.000000e-1"), "{output}");
        assert!(output.contains("Voltage (V)=2.000000e-5"), "{output}");
        assert!(output.contains("setpoint=0.1"), "{output}");
    }

    #[test]
    fn tee_sink_feeds_both_sinks() {
        struct Counter(usize);
        impl ResultSink for Counter {
            fn emit(&mut self, _m: Measurement) -> HardwareResult<()> {
                self.0 += 1;
                Ok(())
            }
        }

        let mut tee = TeeSink(Counter(0), Counter(0));
        tee.emit(record(0.0, 0.0)).unwrap();
        tee.emit(record(0.1, 0.0)).unwrap();
        assert_eq!(tee.0 .0, 2);
        assert_eq!(tee.1 .0, 2);
    }
}
