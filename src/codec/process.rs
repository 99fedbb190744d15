use super::{types::*, Codec, Symbology};
use crate::config::Config;
use crate::error::{CodecFailure, Error, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::collections::BTreeSet;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Output, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Codec backed by an external barcode tool speaking JSON on stdin/stdout.
///
/// One process is spawned per call. The tool receives a single
/// [`CodecRequest`] and must print a single [`CodecReply`].
pub struct ProcessCodec {
    cfg: crate::config::Codec,
    program: PathBuf,
}

impl ProcessCodec {
    pub fn new(cfg: &Config) -> Result<Self> {
        let raw = cfg.codec.program.trim();
        if raw.is_empty() {
            return Err(Error::InvalidConfig("codec.program is empty".into()));
        }
        Ok(Self {
            cfg: cfg.codec.clone(),
            program: expand_tilde(raw),
        })
    }

    fn run_json(&self, req: &CodecRequest, timeout_seconds: u64) -> Result<CodecReply> {
        debug!(program = %self.program.display(), timeout_seconds, "codec call");
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.cfg.args);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        for (k, v) in &self.cfg.env {
            cmd.env(k, v);
        }

        let mut child = cmd.spawn().map_err(|e| {
            Error::codec(
                CodecFailure::InternalError,
                format!("spawning {}: {e}", self.program.display()),
            )
        })?;

        {
            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| Error::codec(CodecFailure::InternalError, "no stdin"))?;
            let bytes = serde_json::to_vec(req)
                .map_err(|e| Error::codec(CodecFailure::InternalError, e.to_string()))?;
            stdin
                .write_all(&bytes)
                .map_err(|e| Error::codec(CodecFailure::InternalError, e.to_string()))?;
            stdin.flush().ok();
        }

        let output = wait_with_timeout(&mut child, Duration::from_secs(timeout_seconds.max(1)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::codec(
                CodecFailure::InternalError,
                format!("{} exited with {}: {}", self.program.display(), output.status, stderr.trim()),
            ));
        }
        if !output.stderr.is_empty() {
            debug!(stderr = %String::from_utf8_lossy(&output.stderr).trim(), "codec stderr");
        }

        serde_json::from_slice(&output.stdout).map_err(|e| {
            Error::codec(
                CodecFailure::InternalError,
                format!("parsing codec reply: {e}"),
            )
        })
    }
}

fn reply_error(reply: &CodecReply, fallback: CodecFailure) -> Error {
    Error::Codec {
        failure: reply.error_kind.unwrap_or(fallback),
        detail: reply.error.clone(),
    }
}

impl Codec for ProcessCodec {
    fn doctor(&self) -> Result<CodecDiag> {
        let program = self.program.display().to_string();
        match self.run_json(&CodecRequest::Doctor, self.cfg.doctor_timeout_seconds) {
            Ok(reply) => Ok(CodecDiag {
                program,
                version: reply.version,
                ok: reply.ok,
                error: reply.error,
            }),
            Err(e) => Ok(CodecDiag {
                program,
                version: None,
                ok: false,
                error: Some(e.to_string()),
            }),
        }
    }

    fn generate(
        &self,
        payload: &[u8],
        format: Symbology,
        width_px: u32,
        height_px: u32,
        use_base64: bool,
    ) -> Result<Vec<u8>> {
        if payload.is_empty() {
            return Err(Error::codec(CodecFailure::InvalidPayload, "empty payload"));
        }
        let text = if use_base64 {
            STANDARD.encode(payload)
        } else {
            String::from_utf8(payload.to_vec()).map_err(|_| {
                Error::codec(
                    CodecFailure::InvalidPayload,
                    "payload is not UTF-8; enable base64",
                )
            })?
        };

        let reply = self.run_json(
            &CodecRequest::Generate {
                text,
                format,
                width: width_px,
                height: height_px,
                margin: self.cfg.margin,
            },
            self.cfg.timeout_seconds,
        )?;
        if !reply.ok {
            return Err(reply_error(&reply, CodecFailure::InternalError));
        }
        let encoded = reply
            .image_b64
            .ok_or_else(|| Error::codec(CodecFailure::InternalError, "reply has no image"))?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| Error::codec(CodecFailure::InternalError, format!("image_b64: {e}")))
    }

    fn decode(
        &self,
        image: &[u8],
        formats: &BTreeSet<Symbology>,
        use_base64: bool,
    ) -> Result<DecodeHit> {
        if image.is_empty() {
            return Err(Error::codec(CodecFailure::InvalidImage, "empty image"));
        }
        let reply = self.run_json(
            &CodecRequest::Decode {
                image_b64: STANDARD.encode(image),
                formats: formats.iter().copied().collect(),
                try_all_formats: formats.is_empty(),
            },
            self.cfg.timeout_seconds,
        )?;
        if !reply.ok {
            return Err(reply_error(&reply, CodecFailure::NotRecognized));
        }
        let format = reply
            .format
            .ok_or_else(|| Error::codec(CodecFailure::InternalError, "reply has no format"))?;
        let text = reply.text.unwrap_or_default();
        let content = if use_base64 {
            STANDARD.decode(text.trim().as_bytes()).map_err(|e| {
                Error::codec(CodecFailure::InvalidPayload, format!("base64 body: {e}"))
            })?
        } else {
            text.into_bytes()
        };
        Ok(DecodeHit { format, content })
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

fn internal(e: impl std::fmt::Display) -> Error {
    Error::codec(CodecFailure::InternalError, e.to_string())
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Result<Output> {
    // Drain pipes while waiting so a chatty codec can't block on a full pipe.
    let stdout_reader = child.stdout.take();
    let stderr_reader = child.stderr.take();

    let stdout_thread = std::thread::spawn(move || -> std::io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        if let Some(mut out) = stdout_reader {
            out.read_to_end(&mut buf)?;
        }
        Ok(buf)
    });

    let stderr_thread = std::thread::spawn(move || -> std::io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        if let Some(mut err) = stderr_reader {
            err.read_to_end(&mut buf)?;
        }
        Ok(buf)
    });

    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait().map_err(internal)? {
            let stdout = stdout_thread
                .join()
                .map_err(|_| internal("stdout reader thread panicked"))?
                .map_err(internal)?;
            let stderr = stderr_thread
                .join()
                .map_err(|_| internal("stderr reader thread panicked"))?
                .map_err(internal)?;
            return Ok(Output {
                status,
                stdout,
                stderr,
            });
        }

        if start.elapsed() > timeout {
            warn!("codec process timed out after {:?}", timeout);
            let _ = child.kill();
            let _ = child.wait();
            let stderr = stderr_thread
                .join()
                .ok()
                .and_then(|r| r.ok())
                .unwrap_or_default();
            let stdout = stdout_thread
                .join()
                .ok()
                .and_then(|r| r.ok())
                .unwrap_or_default();
            if !stdout.is_empty() {
                debug!(stdout = %String::from_utf8_lossy(&stdout).trim(), "codec stdout before timeout");
            }
            return Err(Error::codec(
                CodecFailure::InternalError,
                format!(
                    "codec exceeded timeout ({:?}); stderr: {}",
                    timeout,
                    String::from_utf8_lossy(&stderr).trim()
                ),
            ));
        }

        std::thread::sleep(Duration::from_millis(20));
    }
}
