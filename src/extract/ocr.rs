//! Optical character recognition for image-only PDFs

use crate::extract::ExtractionError;
use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// How often a running OCR process is checked for completion
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A raster image found inside a PDF
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedImage {
    pub width: u32,
    pub height: u32,
    /// Set for JPEG (`DCTDecode`) and JPEG 2000 (`JPXDecode`) streams
    pub encoded_format: Option<&'static str>,
    /// Encoded image bytes, or raw pixels when `encoded_format` is `None`
    pub data: Vec<u8>,
    /// Color components per pixel for raw pixel data
    pub components: u8,
}

impl EmbeddedImage {
    /// Returns the image in a format an external recognizer can read
    ///
    /// Encoded streams are passed through; raw 8-bit grayscale or RGB pixels are
    /// wrapped in a binary PGM/PPM header.
    pub fn to_image_file(&self) -> Option<Vec<u8>> {
        if self.encoded_format.is_some() {
            return Some(self.data.clone());
        }

        let magic = match self.components {
            1 => "P5",
            3 => "P6",
            _ => return None,
        };
        let expected = self.width as usize * self.height as usize * self.components as usize;
        if self.data.len() < expected || expected == 0 {
            return None;
        }

        let mut out = format!("{}\n{} {}\n255\n", magic, self.width, self.height).into_bytes();
        out.extend_from_slice(&self.data[..expected]);
        Some(out)
    }
}

/// Turns an image into text
pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, image: &EmbeddedImage) -> Result<String, ExtractionError>;
}

/// Recognizer that runs an external OCR program
///
/// The image file is written to the program's stdin and the recognized text is
/// read from its stdout, e.g. `tesseract stdin stdout`. A process still running
/// after `timeout` is killed.
#[derive(Debug, Clone)]
pub struct CommandRecognizer {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandRecognizer {
    /// Builds a recognizer from a whitespace-separated command line
    pub fn from_command_line(command: &str, timeout: Duration) -> Option<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
            timeout,
        })
    }
}

/// Reads a child pipe to its end on a separate thread
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buffer);
        }
        buffer
    })
}

impl TextRecognizer for CommandRecognizer {
    fn recognize(&self, image: &EmbeddedImage) -> Result<String, ExtractionError> {
        let input = image.to_image_file().ok_or_else(|| {
            ExtractionError::OcrFailure(format!(
                "unsupported image layout ({} components)",
                image.components
            ))
        })?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ExtractionError::OcrFailure(format!("failed to start {}: {}", self.program, e)))?;

        // A program that exits without reading its input closes the pipe; its
        // exit status is what gets reported.
        let stdin = child.stdin.take();
        let writer = thread::spawn(move || {
            if let Some(mut stdin) = stdin {
                let _ = stdin.write_all(&input);
            }
        });
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ExtractionError::OcrFailure(format!(
                        "{} timed out after {:?}",
                        self.program, self.timeout
                    )));
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    let _ = child.kill();
                    return Err(ExtractionError::OcrFailure(e.to_string()));
                }
            }
        };

        let _ = writer.join();
        let stdout = stdout.join().unwrap_or_default();
        let stderr = stderr.join().unwrap_or_default();

        if !status.success() {
            return Err(ExtractionError::OcrFailure(format!(
                "{} exited with {}: {}",
                self.program,
                status,
                String::from_utf8_lossy(&stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }
}
