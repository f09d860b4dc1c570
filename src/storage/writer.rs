use crate::cpu::Sample;
use crate::error::Result;
use crate::symbols::SymbolInfo;
use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Column header written at the start of every capture window
pub const HEADER: &str = "# time;cpu;pid;comm;dso;addr;sym";

/// Append-only text log of resolved samples.
///
/// `-` writes to stdout; anything else is a file opened in append mode.
pub struct ProfileWriter {
    out: BufWriter<Box<dyn Write + Send>>,
    to_stdout: bool,
    samples: u64,
}

impl ProfileWriter {
    pub fn open(path: &Path) -> Result<Self> {
        if path.as_os_str() == "-" {
            return Ok(Self::from_writer(Box::new(io::stdout()), true));
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| {
                io::Error::new(
                    e.kind(),
                    format!("could not open '{}' for writing: {}", path.display(), e),
                )
            })?;

        Ok(Self::from_writer(Box::new(file), false))
    }

    pub fn from_writer(out: Box<dyn Write + Send>, to_stdout: bool) -> Self {
        ProfileWriter {
            out: BufWriter::new(out),
            to_stdout,
            samples: 0,
        }
    }

    /// Timestamped status line, mirrored to the log
    pub fn message(&mut self, args: fmt::Arguments<'_>) -> Result<()> {
        let now = chrono::Local::now().format("%F %T");
        writeln!(self.out, "{}: {}", now, args)?;
        self.out.flush()?;
        if !self.to_stdout {
            log::info!("{}", args);
        }
        Ok(())
    }

    pub fn begin_window(&mut self) -> Result<()> {
        writeln!(self.out, "{}", HEADER)?;
        Ok(())
    }

    pub fn record_sample(&mut self, sample: &Sample, info: &SymbolInfo<'_>) -> Result<()> {
        writeln!(
            self.out,
            "{};{};{};{};{};0x{:x};{}",
            sample.time,
            sample.cpu,
            sample.pid,
            info.process_name,
            info.binary_path,
            info.address,
            info.symbol_name
        )?;
        self.samples += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }

    /// Samples written since opening
    pub fn total_samples(&self) -> u64 {
        self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Sample {
        Sample {
            ip: 0x56373c46a100,
            pid: 100,
            tid: 101,
            time: 5000,
            cpu: 2,
        }
    }

    #[test]
    fn test_sample_line_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.txt");

        let mut writer = ProfileWriter::open(&path).unwrap();
        writer.begin_window().unwrap();
        writer
            .record_sample(
                &sample(),
                &SymbolInfo {
                    process_name: "python2.7",
                    binary_path: "/usr/bin/python2.7",
                    address: 0x10a,
                    symbol_name: "-",
                },
            )
            .unwrap();
        writer.flush().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            format!("{}\n5000;2;100;python2.7;/usr/bin/python2.7;0x10a;-\n", HEADER)
        );
        assert_eq!(writer.total_samples(), 1);
    }

    #[test]
    fn test_appends_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.txt");

        for _ in 0..2 {
            let mut writer = ProfileWriter::open(&path).unwrap();
            writer.begin_window().unwrap();
            writer.flush().unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().filter(|l| *l == HEADER).count(), 2);
    }

    #[test]
    fn test_message_is_timestamped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.txt");

        let mut writer = ProfileWriter::open(&path).unwrap();
        writer.message(format_args!("starting profile")).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let line = content.lines().next().unwrap();
        assert!(line.ends_with(": starting profile"));
        // "YYYY-MM-DD HH:MM:SS"
        assert_eq!(line.find(": starting"), Some(19));
    }

    #[test]
    fn test_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ProfileWriter::open(&dir.path().join("nope/profile.txt")).is_err());
    }
}
