//! Remote edit / video generation.
//!
//! [`EditGateway`] is the only seam to the generative model. Two backends are
//! provided: [`GeminiGateway`] talks to the hosted REST API with a blocking
//! client, [`CommandGateway`] hands the work to a local program.

use crate::error::GatewayError;
use crate::media::{ImagePayload, DEFAULT_RESULT_MIME};
use crate::util::truncate_text;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::blocking::Client;
use serde_json::{json, Value};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use wait_timeout::ChildExt;

pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";
pub const DEFAULT_VIDEO_MODEL: &str = "veo-3.1-fast-generate-preview";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_VIDEO_POLL: Duration = Duration::from_secs(10);
pub const VIDEO_MIME: &str = "video/mp4";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoPayload {
    pub mime: String,
    pub bytes: Vec<u8>,
}

pub trait EditGateway {
    /// One image + instruction in, one edited image out.
    fn edit_image(&self, bytes: &[u8], mime: &str, prompt: &str)
        -> Result<ImagePayload, GatewayError>;

    /// Starts a video job and blocks until the clip is downloaded.
    fn generate_video(
        &self,
        bytes: &[u8],
        mime: &str,
        prompt: &str,
    ) -> Result<VideoPayload, GatewayError>;
}

#[derive(Debug, Clone)]
pub struct GeminiGateway {
    client: Client,
    api_key: String,
    api_base: String,
    image_model: String,
    video_model: String,
    poll_interval: Duration,
    max_video_wait: Option<Duration>,
}

impl GeminiGateway {
    pub fn new(
        api_key: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|err| GatewayError::failure(format!("build http client failed: {err}")))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            video_model: DEFAULT_VIDEO_MODEL.to_string(),
            poll_interval: DEFAULT_VIDEO_POLL,
            max_video_wait: None,
        })
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_models(mut self, image_model: impl Into<String>, video_model: impl Into<String>) -> Self {
        self.image_model = image_model.into();
        self.video_model = video_model.into();
        self
    }

    pub fn with_video_polling(mut self, interval: Duration, max_wait: Option<Duration>) -> Self {
        self.poll_interval = interval;
        self.max_video_wait = max_wait;
        self
    }

    fn post_json(&self, url: &str, body: &Value) -> Result<Value, GatewayError> {
        let resp = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .map_err(|err| GatewayError::failure(format!("request failed: {err}")))?;
        read_json(resp)
    }

    fn get_json(&self, url: &str) -> Result<Value, GatewayError> {
        let resp = self
            .client
            .get(url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .map_err(|err| GatewayError::failure(format!("poll request failed: {err}")))?;
        read_json(resp)
    }
}

fn read_json(resp: reqwest::blocking::Response) -> Result<Value, GatewayError> {
    let status = resp.status().as_u16();
    let text = resp
        .text()
        .map_err(|err| GatewayError::failure(format!("read response failed: {err}")))?;
    if status >= 300 {
        return Err(GatewayError::failure(format!(
            "error status={status}: {}",
            truncate_text(&text, 400)
        )));
    }
    serde_json::from_str(&text)
        .map_err(|err| GatewayError::failure(format!("parse response failed: {err}")))
}

impl EditGateway for GeminiGateway {
    fn edit_image(
        &self,
        bytes: &[u8],
        mime: &str,
        prompt: &str,
    ) -> Result<ImagePayload, GatewayError> {
        let url = format!("{}/models/{}:generateContent", self.api_base, self.image_model);
        let body = edit_request_body(bytes, mime, prompt);
        info!(model = %self.image_model, bytes = bytes.len(), "edit request");
        let resp = self.post_json(&url, &body)?;
        parse_edit_response(&resp)
    }

    fn generate_video(
        &self,
        bytes: &[u8],
        mime: &str,
        prompt: &str,
    ) -> Result<VideoPayload, GatewayError> {
        let url = format!("{}/models/{}:predictLongRunning", self.api_base, self.video_model);
        let body = json!({
            "instances": [{
                "prompt": prompt,
                "image": { "bytesBase64Encoded": STANDARD.encode(bytes), "mimeType": mime },
            }],
            "parameters": { "sampleCount": 1, "resolution": "720p", "aspectRatio": "16:9" },
        });
        info!(model = %self.video_model, "video request");
        let mut operation = self.post_json(&url, &body)?;
        let name = operation
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| GatewayError::failure("video operation has no name"))?;

        let started = Instant::now();
        let uri = loop {
            if let Some(uri) = parse_video_operation(&operation)? {
                break uri;
            }
            if let Some(max_wait) = self.max_video_wait {
                if started.elapsed() >= max_wait {
                    return Err(GatewayError::Timeout(max_wait.as_secs()));
                }
            }
            debug!(operation = %name, elapsed = started.elapsed().as_secs(), "video not ready");
            thread::sleep(self.poll_interval);
            operation = self.get_json(&format!("{}/{}", self.api_base, name))?;
        };

        let resp = self
            .client
            .get(with_key(&uri, &self.api_key))
            .send()
            .map_err(|err| GatewayError::failure(format!("failed to download video: {err}")))?;
        if !resp.status().is_success() {
            return Err(GatewayError::failure(format!(
                "failed to download video: {}",
                resp.status()
            )));
        }
        let mime = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(VIDEO_MIME)
            .to_string();
        let bytes = resp
            .bytes()
            .map_err(|err| GatewayError::failure(format!("read video bytes failed: {err}")))?
            .to_vec();
        if bytes.is_empty() {
            return Err(GatewayError::EmptyResponse);
        }
        Ok(VideoPayload { mime, bytes })
    }
}

pub fn edit_request_body(bytes: &[u8], mime: &str, prompt: &str) -> Value {
    json!({
        "contents": [{
            "parts": [
                { "inlineData": { "data": STANDARD.encode(bytes), "mimeType": mime } },
                { "text": prompt },
            ],
        }],
        "generationConfig": { "responseModalities": ["IMAGE"] },
    })
}

/// First inline image part wins; otherwise a block reason or an empty
/// response.
pub fn parse_edit_response(resp: &Value) -> Result<ImagePayload, GatewayError> {
    let parts = resp
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array);
    for part in parts.into_iter().flatten() {
        let Some(inline) = part.get("inlineData").or_else(|| part.get("inline_data")) else {
            continue;
        };
        let Some(data) = inline.get("data").and_then(Value::as_str) else {
            continue;
        };
        let mime = inline
            .get("mimeType")
            .or_else(|| inline.get("mime_type"))
            .and_then(Value::as_str);
        return ImagePayload::from_base64(mime, data)
            .map_err(|err| GatewayError::failure(format!("decode image base64 failed: {err}")));
    }
    if let Some(reason) = resp
        .pointer("/promptFeedback/blockReason")
        .and_then(Value::as_str)
    {
        return Err(GatewayError::SafetyBlock(reason.to_string()));
    }
    Err(GatewayError::EmptyResponse)
}

/// `Ok(None)` while the operation is still running.
pub fn parse_video_operation(op: &Value) -> Result<Option<String>, GatewayError> {
    if let Some(err) = op.get("error") {
        let msg = err
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("video operation failed");
        return Err(GatewayError::failure(msg.to_string()));
    }
    if !op.get("done").and_then(Value::as_bool).unwrap_or(false) {
        return Ok(None);
    }
    let uri = op
        .pointer("/response/generateVideoResponse/generatedSamples/0/video/uri")
        .or_else(|| op.pointer("/response/generatedVideos/0/video/uri"))
        .and_then(Value::as_str);
    match uri {
        Some(uri) => Ok(Some(uri.to_string())),
        None => Err(GatewayError::failure(
            "video generation succeeded but no download link was found",
        )),
    }
}

fn with_key(uri: &str, key: &str) -> String {
    let sep = if uri.contains('?') { '&' } else { '?' };
    format!("{uri}{sep}key={key}")
}

/// Delegates to an external program:
/// `<bin> edit|video --image <in> --mime <mime> --out <out>`, prompt on stdin.
#[derive(Debug, Clone)]
pub struct CommandGateway {
    bin: String,
    timeout: Duration,
    scratch_dir: PathBuf,
}

impl CommandGateway {
    pub fn new(bin: impl Into<String>, timeout: Duration, scratch_dir: PathBuf) -> Self {
        Self {
            bin: bin.into(),
            timeout,
            scratch_dir,
        }
    }

    fn run(&self, mode: &str, bytes: &[u8], mime: &str, prompt: &str) -> Result<Vec<u8>, GatewayError> {
        let io_err = |what: &str, err: std::io::Error| GatewayError::failure(format!("{what}: {err}"));
        fs::create_dir_all(&self.scratch_dir).map_err(|e| io_err("create scratch dir", e))?;
        let stem = uuid::Uuid::new_v4().to_string();
        let input = self.scratch_dir.join(format!("{stem}.in"));
        let output = self.scratch_dir.join(format!("{stem}.out"));
        fs::write(&input, bytes).map_err(|e| io_err("write gateway input", e))?;

        let result = self.spawn_and_wait(mode, &input, &output, mime, prompt);
        let produced = result.and_then(|()| fs::read(&output).map_err(|_| GatewayError::EmptyResponse));
        let _ = fs::remove_file(&input);
        let _ = fs::remove_file(&output);

        let produced = produced?;
        if produced.is_empty() {
            return Err(GatewayError::EmptyResponse);
        }
        Ok(produced)
    }

    fn spawn_and_wait(
        &self,
        mode: &str,
        input: &std::path::Path,
        output: &std::path::Path,
        mime: &str,
        prompt: &str,
    ) -> Result<(), GatewayError> {
        let mut cmd = Command::new(&self.bin);
        cmd.arg(mode)
            .arg("--image")
            .arg(input)
            .arg("--mime")
            .arg(mime)
            .arg("--out")
            .arg(output);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|err| GatewayError::failure(format!("failed to start {}: {err}", self.bin)))?;
        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.write_all(prompt.as_bytes());
        }

        let status = child
            .wait_timeout(self.timeout)
            .map_err(|err| GatewayError::failure(format!("wait for {} failed: {err}", self.bin)))?;
        if status.is_none() {
            let _ = child.kill();
            let _ = child.wait();
            warn!(bin = %self.bin, mode, "gateway command timed out");
            return Err(GatewayError::Timeout(self.timeout.as_secs()));
        }

        let out = child
            .wait_with_output()
            .map_err(|err| GatewayError::failure(format!("read {} output failed: {err}", self.bin)))?;
        let stderr = String::from_utf8_lossy(&out.stderr);
        if let Some(reason) = stderr
            .lines()
            .find_map(|line| line.trim().strip_prefix("blocked:"))
        {
            return Err(GatewayError::SafetyBlock(reason.trim().to_string()));
        }
        if !out.status.success() {
            return Err(GatewayError::failure(format!(
                "{} {mode} exited with {}: {}",
                self.bin,
                out.status.code().unwrap_or(1),
                truncate_text(stderr.trim(), 400)
            )));
        }
        Ok(())
    }
}

impl EditGateway for CommandGateway {
    fn edit_image(
        &self,
        bytes: &[u8],
        mime: &str,
        prompt: &str,
    ) -> Result<ImagePayload, GatewayError> {
        let produced = self.run("edit", bytes, mime, prompt)?;
        let out_mime = image::guess_format(&produced)
            .map(|f| f.to_mime_type())
            .unwrap_or(DEFAULT_RESULT_MIME);
        Ok(ImagePayload::new(out_mime, produced))
    }

    fn generate_video(
        &self,
        bytes: &[u8],
        mime: &str,
        prompt: &str,
    ) -> Result<VideoPayload, GatewayError> {
        let produced = self.run("video", bytes, mime, prompt)?;
        Ok(VideoPayload {
            mime: VIDEO_MIME.to_string(),
            bytes: produced,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_inline_part_is_the_result() {
        let resp = json!({
            "candidates": [{ "content": { "parts": [
                { "text": "here you go" },
                { "inlineData": { "mimeType": "image/jpeg", "data": STANDARD.encode(b"abc") } },
                { "inlineData": { "mimeType": "image/png", "data": STANDARD.encode(b"zzz") } },
            ]}}]
        });
        let payload = parse_edit_response(&resp).unwrap();
        assert_eq!(payload.mime, "image/jpeg");
        assert_eq!(payload.bytes, b"abc");
    }

    #[test]
    fn missing_mime_defaults_to_png() {
        let resp = json!({
            "candidates": [{ "content": { "parts": [
                { "inlineData": { "data": STANDARD.encode(b"abc") } },
            ]}}]
        });
        assert_eq!(parse_edit_response(&resp).unwrap().mime, "image/png");
    }

    #[test]
    fn block_reason_maps_to_safety_block() {
        let resp = json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        assert_eq!(
            parse_edit_response(&resp),
            Err(GatewayError::SafetyBlock("SAFETY".into()))
        );
        assert_eq!(parse_edit_response(&json!({})), Err(GatewayError::EmptyResponse));
    }

    #[test]
    fn request_body_carries_image_then_prompt() {
        let body = edit_request_body(b"img", "image/png", "do it");
        assert_eq!(
            body.pointer("/contents/0/parts/0/inlineData/mimeType"),
            Some(&json!("image/png"))
        );
        assert_eq!(body.pointer("/contents/0/parts/1/text"), Some(&json!("do it")));
        assert_eq!(
            body.pointer("/generationConfig/responseModalities/0"),
            Some(&json!("IMAGE"))
        );
    }

    #[test]
    fn video_operation_states() {
        assert_eq!(parse_video_operation(&json!({"name": "op", "done": false})), Ok(None));
        let done = json!({
            "done": true,
            "response": { "generateVideoResponse": { "generatedSamples": [
                { "video": { "uri": "https://x/v?alt=media" } }
            ]}}
        });
        assert_eq!(
            parse_video_operation(&done),
            Ok(Some("https://x/v?alt=media".to_string()))
        );
        assert!(parse_video_operation(&json!({"done": true, "response": {}})).is_err());
        assert!(parse_video_operation(&json!({"error": {"message": "quota"}})).is_err());
        assert_eq!(with_key("https://x/v?alt=media", "k"), "https://x/v?alt=media&key=k");
        assert_eq!(with_key("https://x/v", "k"), "https://x/v?key=k");
    }

    #[cfg(unix)]
    mod command {
        use super::super::*;
        use std::os::unix::fs::PermissionsExt;

        const FAKE_EDITOR: &str = r#"#!/bin/sh
mode=$1; shift
while [ $# -gt 0 ]; do
  case "$1" in
    --image) img=$2; shift 2 ;;
    --out) out=$2; shift 2 ;;
    *) shift ;;
  esac
done
prompt=$(cat)
case "$prompt" in
  *forbidden*) echo "blocked: PROHIBITED_CONTENT" >&2; exit 3 ;;
  *sleep*) sleep 5 ;;
  *crash*) echo "boom" >&2; exit 2 ;;
esac
cp "$img" "$out"
"#;

        fn gateway(dir: &tempfile::TempDir, timeout: Duration) -> CommandGateway {
            let script = dir.path().join("fake-editor.sh");
            fs::write(&script, FAKE_EDITOR).unwrap();
            fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
            CommandGateway::new(
                script.display().to_string(),
                timeout,
                dir.path().join("scratch"),
            )
        }

        #[test]
        fn echo_program_returns_its_output() {
            let dir = tempfile::tempdir().unwrap();
            let gw = gateway(&dir, Duration::from_secs(10));
            let png = crate::media::fixtures::png_bytes(4, 4, [1, 2, 3, 255]);
            let out = gw.edit_image(&png, "image/png", "make it nice").unwrap();
            assert_eq!(out.bytes, png);
            assert_eq!(out.mime, "image/png");
            let video = gw.generate_video(&png, "image/png", "animate").unwrap();
            assert_eq!(video.mime, VIDEO_MIME);
        }

        #[test]
        fn blocked_line_is_a_safety_block() {
            let dir = tempfile::tempdir().unwrap();
            let gw = gateway(&dir, Duration::from_secs(10));
            let err = gw.edit_image(b"x", "image/png", "forbidden").unwrap_err();
            assert_eq!(err, GatewayError::SafetyBlock("PROHIBITED_CONTENT".into()));
        }

        #[test]
        fn failing_program_is_a_gateway_failure() {
            let dir = tempfile::tempdir().unwrap();
            let gw = gateway(&dir, Duration::from_secs(10));
            let err = gw.edit_image(b"x", "image/png", "crash").unwrap_err();
            assert_eq!(err.kind(), "gateway_failure");
        }

        #[test]
        fn slow_program_is_killed_on_timeout() {
            let dir = tempfile::tempdir().unwrap();
            let gw = gateway(&dir, Duration::from_secs(1));
            let err = gw.edit_image(b"x", "image/png", "sleep").unwrap_err();
            assert_eq!(err, GatewayError::Timeout(1));
        }
    }
}
