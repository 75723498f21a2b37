//! Composable streaming fetch pipeline.
//!
//! A [`Pipeline`] carries a byte source plus stream metadata, an accumulated
//! close chain and a sticky error. Stages are chainable builders; a stage
//! invoked on an errored pipeline is a no-op that forwards the error.
//! Terminal stages (`read_all`, `write_to`, `untar_to`) consume the pipeline,
//! run the close chain exactly once and fold any close-time verdict (checksum
//! or signature mismatch) into the returned error.
//!
//! Order is significant: verification stages digest the bytes they see, so
//! `validate_checksum` has to sit before `decompress_if_compressed` to verify
//! the on-the-wire payload, and `untar_to` has to follow decompression.

use crate::error::{Result, ToolbeltError};
use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use indicatif::{ProgressBar, ProgressStyle};
use rsa::{Pss, RsaPublicKey};
use sha2::{Digest, Sha256};
use std::cell::RefCell;
use std::fs::{self, File};
use std::io::{self, BufWriter, Cursor, Read, Write};
use std::path::{Component, Path};
use std::rc::Rc;

/// Options for the `download` stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct DownloadFlags {
    /// Ask the server for an identity encoding so verification stages see
    /// the exact artifact bytes.
    pub without_compression: bool,
    /// Treat non-2xx responses as a regular body instead of an error.
    pub ignore_errors: bool,
}

/// Metadata captured when the stream is opened.
#[derive(Debug, Clone, Default)]
pub struct StreamMeta {
    pub content_length: u64,
    pub content_encoding: String,
}

type CloseFn = Box<dyn FnOnce() -> Result<()>>;

pub struct Pipeline {
    reader: Box<dyn Read>,
    meta: StreamMeta,
    close: Vec<CloseFn>,
    err: Option<ToolbeltError>,
}

/// Splits the stream so a digest sees every byte on its way downstream.
struct TeeReader {
    inner: Box<dyn Read>,
    hasher: Rc<RefCell<Sha256>>,
}

impl Read for TeeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.borrow_mut().update(&buf[..n]);
        Ok(n)
    }
}

impl Pipeline {
    /// Start a pipeline with a GET request.
    pub fn download(url: &str, flags: DownloadFlags) -> Pipeline {
        let client = match reqwest::blocking::Client::builder()
            .user_agent(concat!("tbx/", env!("CARGO_PKG_VERSION")))
            .build()
        {
            Ok(client) => client,
            Err(e) => return Pipeline::failed(e.into()),
        };

        let mut request = client.get(url);
        if flags.without_compression {
            request = request.header(reqwest::header::ACCEPT_ENCODING, "identity");
        }

        let response = match request.send() {
            Ok(response) => response,
            Err(e) => {
                return Pipeline::failed(ToolbeltError::Other(anyhow::anyhow!(
                    "could not request {}: {}",
                    url,
                    e
                )))
            }
        };

        if !flags.ignore_errors && !response.status().is_success() {
            return Pipeline::failed(ToolbeltError::HttpStatus(response.status().to_string()));
        }

        let meta = StreamMeta {
            content_length: response.content_length().unwrap_or(0),
            content_encoding: response
                .headers()
                .get(reqwest::header::CONTENT_ENCODING)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string(),
        };

        Pipeline {
            reader: Box::new(response),
            meta,
            close: Vec::new(),
            err: None,
        }
    }

    /// Start a pipeline from an arbitrary reader. Lets callers (and tests)
    /// reuse the verification and extraction stages on local data.
    pub fn from_reader(reader: Box<dyn Read>, meta: StreamMeta) -> Pipeline {
        Pipeline {
            reader,
            meta,
            close: Vec::new(),
            err: None,
        }
    }

    fn failed(err: ToolbeltError) -> Pipeline {
        Pipeline {
            reader: Box::new(io::empty()),
            meta: StreamMeta::default(),
            close: Vec::new(),
            err: Some(err),
        }
    }

    pub fn meta(&self) -> &StreamMeta {
        &self.meta
    }

    /// Tee the stream through a progress bar sized by Content-Length.
    pub fn show_progress(mut self, prefix: &str) -> Pipeline {
        if self.err.is_some() {
            return self;
        }

        let bar = ProgressBar::new(self.meta.content_length);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
                .map(|style| style.progress_chars("━━╸"))
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.set_message(prefix.to_string());

        self.reader = Box::new(bar.clone().wrap_read(self.reader));
        self.close.push(Box::new(move || {
            bar.finish_and_clear();
            Ok(())
        }));
        self
    }

    /// Digest the stream and compare against a hex-encoded sha256 at close.
    pub fn validate_checksum(mut self, checksum: &str) -> Pipeline {
        if self.err.is_some() {
            return self;
        }

        let hasher = Rc::new(RefCell::new(Sha256::new()));
        self.reader = Box::new(TeeReader {
            inner: self.reader,
            hasher: Rc::clone(&hasher),
        });

        let expected = checksum.to_ascii_lowercase();
        self.close.push(Box::new(move || {
            let digest = hasher.borrow().clone().finalize();
            if format!("{:x}", digest) != expected {
                return Err(ToolbeltError::InvalidChecksum);
            }
            Ok(())
        }));
        self
    }

    /// Digest the stream and verify an RSA-PSS-SHA256 signature at close.
    pub fn validate_signature(mut self, signature: Vec<u8>, public_key: RsaPublicKey) -> Pipeline {
        if self.err.is_some() {
            return self;
        }

        let hasher = Rc::new(RefCell::new(Sha256::new()));
        self.reader = Box::new(TeeReader {
            inner: self.reader,
            hasher: Rc::clone(&hasher),
        });

        self.close.push(Box::new(move || {
            let digest = hasher.borrow().clone().finalize();
            public_key
                .verify(Pss::new::<Sha256>(), &digest, &signature)
                .map_err(|_| ToolbeltError::InvalidSignature)
        }));
        self
    }

    /// Peek at the magic bytes and decompress gzip (`1F 8B`) or bzip2
    /// (`42 5A 68`) streams on the fly; anything else passes through.
    pub fn decompress_if_compressed(mut self) -> Pipeline {
        if self.err.is_some() {
            return self;
        }

        let mut head = [0u8; 3];
        let mut filled = 0;
        while filled < head.len() {
            match self.reader.read(&mut head[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) => {
                    let _ = self.run_close();
                    return Pipeline::failed(ToolbeltError::Other(anyhow::anyhow!(
                        "could not peek on the stream: {}",
                        e
                    )));
                }
            }
        }

        let headed: Box<dyn Read> =
            Box::new(Cursor::new(head[..filled].to_vec()).chain(self.reader));

        self.reader = if filled >= 2 && head[0] == 0x1F && head[1] == 0x8B {
            Box::new(GzDecoder::new(headed))
        } else if filled >= 3 && head[0] == 0x42 && head[1] == 0x5A && head[2] == 0x68 {
            Box::new(BzDecoder::new(headed))
        } else {
            headed
        };
        self
    }

    /// Terminal: read the whole stream into memory.
    pub fn read_all(mut self) -> Result<Vec<u8>> {
        if let Some(err) = self.err.take() {
            return Err(err);
        }

        let mut bytes = Vec::new();
        if let Err(e) = self.reader.read_to_end(&mut bytes) {
            let _ = self.run_close();
            return Err(e.into());
        }

        self.run_close()?;
        Ok(bytes)
    }

    /// Terminal: buffered copy into a newly created file.
    pub fn write_to(mut self, path: &Path) -> Result<()> {
        if let Some(err) = self.err.take() {
            return Err(err);
        }

        let file = match File::create(path) {
            Ok(file) => file,
            Err(e) => {
                let _ = self.run_close();
                return Err(ToolbeltError::Other(anyhow::anyhow!(
                    "could not create destination file: {}",
                    e
                )));
            }
        };

        let mut writer = BufWriter::new(file);
        if let Err(e) = io::copy(&mut self.reader, &mut writer) {
            let _ = self.run_close();
            return Err(e.into());
        }
        if let Err(e) = writer.flush() {
            let _ = self.run_close();
            return Err(e.into());
        }

        self.run_close()
    }

    /// Terminal: unpack a tar stream under `prefix`, dropping the first
    /// `strip_components` path elements of every entry. Entries whose path
    /// vanishes entirely are skipped, as are unknown entry types.
    pub fn untar_to(mut self, prefix: &Path, strip_components: usize) -> Result<()> {
        if let Some(err) = self.err.take() {
            return Err(err);
        }

        let result = {
            let mut archive = tar::Archive::new(&mut self.reader);
            unpack_entries(&mut archive, prefix, strip_components)
        };
        if let Err(e) = result {
            let _ = self.run_close();
            return Err(e);
        }

        self.run_close()
    }

    /// Run every accumulated close action once, keeping the first error.
    fn run_close(&mut self) -> Result<()> {
        let mut first: Option<ToolbeltError> = None;
        for close in self.close.drain(..) {
            if let Err(e) = close() {
                first.get_or_insert(e);
            }
        }
        match first {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn unpack_entries<R: Read>(
    archive: &mut tar::Archive<R>,
    prefix: &Path,
    strip_components: usize,
) -> Result<()> {
    for entry in archive
        .entries()
        .map_err(|e| anyhow::anyhow!("untar failed: cannot open stream: {}", e))?
    {
        let mut entry = entry.map_err(|e| anyhow::anyhow!("untar failed: cannot get next entry: {}", e))?;
        let path = entry
            .path()
            .map_err(|e| anyhow::anyhow!("untar failed: invalid entry path: {}", e))?
            .into_owned();

        let stripped = match strip_path(&path, strip_components) {
            Some(stripped) => stripped,
            None => continue,
        };
        let target = prefix.join(&stripped);

        match entry.header().entry_type() {
            tar::EntryType::Directory => {
                fs::create_dir_all(&target)
                    .map_err(|e| anyhow::anyhow!("untar failed: cannot create directory: {}", e))?;
                set_mode(&target, 0o755);
            }
            tar::EntryType::Regular => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent).map_err(|e| {
                        anyhow::anyhow!("untar failed: cannot create directory: {}", e)
                    })?;
                }
                let mut file = File::create(&target)
                    .map_err(|e| anyhow::anyhow!("untar failed: cannot create file: {}", e))?;
                io::copy(&mut entry, &mut file)
                    .map_err(|e| anyhow::anyhow!("untar failed: cannot copy file contents: {}", e))?;
            }
            _ => {}
        }
    }

    Ok(())
}

/// Drop the first `strip` normal components from a tar entry path.
/// Returns `None` when nothing is left.
fn strip_path(path: &Path, strip: usize) -> Option<std::path::PathBuf> {
    let components: Vec<_> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect();

    if components.len() <= strip {
        return None;
    }

    Some(components[strip..].iter().collect())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    let _ = fs::set_permissions(path, fs::Permissions::from_mode(mode));
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) {}
