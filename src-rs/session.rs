//! One editing session: uploads, the active tool and its settings, the
//! placement canvas, job statuses and results.
//!
//! A single uploaded image enables the face-swap path (restore tool with
//! placements) and the chained post operations. Two or more images put the
//! session in batch mode.

use crate::batch::{fail_job, process_job, run_batch, BatchJob, JobStatus};
use crate::canvas::{Placement, PlacementCanvas};
use crate::composite::{render_composite, CompositeLayout};
use crate::coords::ContainerRect;
use crate::error::{StudioError, StudioResult};
use crate::gateway::{EditGateway, VideoPayload};
use crate::media::{ImagePayload, PortraitThumbnail, SourceImage};
use crate::post::{watermark_payload, Resolution, WatermarkSettings, ANIMATE_PROMPT};
use crate::tools::{generate_edit_prompt, Tool, ToolSettings};
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{info, warn};

pub struct Session {
    active_tool: Tool,
    originals: Vec<SourceImage>,
    portraits: Vec<PortraitThumbnail>,
    canvas: PlacementCanvas,
    jobs: Vec<BatchJob>,
    settings: HashMap<Tool, ToolSettings>,
    watermark: WatermarkSettings,
    video: Option<VideoPayload>,
    layout: CompositeLayout,
    last_prompt: Option<String>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// A fresh session starts on the restore tool with nothing uploaded.
    pub fn new() -> Self {
        Self {
            active_tool: Tool::Restore,
            originals: Vec::new(),
            portraits: Vec::new(),
            canvas: PlacementCanvas::new(ContainerRect::sized(0.0, 0.0), Vec::<String>::new()),
            jobs: Vec::new(),
            settings: HashMap::new(),
            watermark: WatermarkSettings::default(),
            video: None,
            layout: CompositeLayout::default(),
            last_prompt: None,
        }
    }

    pub fn with_layout(mut self, layout: CompositeLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn active_tool(&self) -> Tool {
        self.active_tool
    }

    pub fn originals(&self) -> &[SourceImage] {
        &self.originals
    }

    pub fn portraits(&self) -> &[PortraitThumbnail] {
        &self.portraits
    }

    pub fn jobs(&self) -> &[BatchJob] {
        &self.jobs
    }

    pub fn video(&self) -> Option<&VideoPayload> {
        self.video.as_ref()
    }

    pub fn last_prompt(&self) -> Option<&str> {
        self.last_prompt.as_deref()
    }

    pub fn is_batch_mode(&self) -> bool {
        self.originals.len() > 1
    }

    /// New uploads replace the old ones and drop everything derived from
    /// them. Settings survive.
    pub fn upload(&mut self, images: Vec<SourceImage>) {
        self.reset(false);
        self.originals = images;
        let container = match self.originals.first().map(SourceImage::dimensions) {
            Some(Ok((w, h))) => ContainerRect::sized(f64::from(w), f64::from(h)),
            _ => ContainerRect::sized(0.0, 0.0),
        };
        self.canvas = PlacementCanvas::new(container, Vec::<String>::new());
        info!(count = self.originals.len(), "images uploaded");
    }

    pub fn add_portrait(&mut self, portrait: PortraitThumbnail) {
        self.canvas.add_portrait(portrait.id.clone());
        self.portraits.push(portrait);
    }

    /// Replaces the placement collection, e.g. with one saved by `place`.
    /// Every placement must reference an added portrait.
    pub fn load_placements(&mut self, placements: Vec<Placement>) -> StudioResult<()> {
        if let Some(orphan) = placements
            .iter()
            .find(|p| !self.portraits.iter().any(|portrait| portrait.id == p.portrait_id))
        {
            return Err(StudioError::invalid_state(format!(
                "placement {} references unknown portrait {}",
                orphan.id, orphan.portrait_id
            )));
        }
        let committed = placements.into_iter().map(Placement::committed).collect();
        let ids: Vec<String> = self.portraits.iter().map(|p| p.id.clone()).collect();
        self.canvas = PlacementCanvas::new(self.canvas.container(), ids).with_placements(committed);
        Ok(())
    }

    pub fn canvas(&self) -> &PlacementCanvas {
        &self.canvas
    }

    /// Clears results, statuses, portraits, placements and post-processing
    /// output. `clear_all` also drops the uploads and every setting.
    pub fn reset(&mut self, clear_all: bool) {
        self.jobs.clear();
        self.video = None;
        self.portraits.clear();
        self.canvas = PlacementCanvas::new(self.canvas.container(), Vec::<String>::new());
        self.last_prompt = None;
        if clear_all {
            self.originals.clear();
            self.settings.clear();
            self.watermark = WatermarkSettings::default();
        }
    }

    /// Switching tools discards shared state and restores the new tool's
    /// defaults. Uploads are kept.
    pub fn switch_tool(&mut self, tool: Tool) {
        self.reset(false);
        self.settings.remove(&tool);
        self.active_tool = tool;
    }

    pub fn settings(&self) -> ToolSettings {
        self.settings
            .get(&self.active_tool)
            .cloned()
            .unwrap_or_else(|| self.active_tool.default_settings())
    }

    pub fn set_settings(&mut self, settings: ToolSettings) {
        self.settings.insert(settings.tool(), settings);
    }

    pub fn set_watermark(&mut self, settings: WatermarkSettings) {
        self.watermark = settings;
    }

    fn face_swap_requested(&self) -> bool {
        self.active_tool.supports_face_swap()
            && !self.canvas.placements().is_empty()
            && !self.portraits.is_empty()
    }

    /// Runs the active tool over the uploads. Per-job failures are recorded
    /// in the job; only a missing upload is an error here.
    pub fn submit<G, F>(&mut self, gateway: &G, mut observer: F) -> StudioResult<&[BatchJob]>
    where
        G: EditGateway + ?Sized,
        F: FnMut(&BatchJob),
    {
        if self.originals.is_empty() {
            return Err(StudioError::invalid_state("no image uploaded"));
        }
        self.jobs.clear();
        self.video = None;
        let tool_prompt = generate_edit_prompt(&self.settings());

        if self.face_swap_requested() && !self.is_batch_mode() {
            let image = &self.originals[0];
            let mut job = BatchJob::pending(image);
            observer(&job);
            match render_composite(
                image,
                &self.portraits,
                self.canvas.placements(),
                &tool_prompt,
                self.layout,
            ) {
                Ok(payload) => {
                    info!(markers = payload.markers.len(), "face swap composite rendered");
                    process_job(
                        &mut job,
                        gateway,
                        &payload.bytes,
                        payload.mime,
                        &payload.prompt,
                        &mut observer,
                    );
                    self.last_prompt = Some(payload.prompt);
                }
                Err(err) => {
                    warn!("composite failed: {err}");
                    fail_job(&mut job, &err, &mut observer);
                    self.last_prompt = Some(tool_prompt);
                }
            }
            self.jobs = vec![job];
        } else {
            if self.face_swap_requested() {
                warn!("placements are ignored in batch mode");
            }
            self.jobs = run_batch(gateway, &self.originals, &tool_prompt, observer);
            self.last_prompt = Some(tool_prompt);
        }
        Ok(&self.jobs)
    }

    /// Most recent successful single-image result.
    pub fn latest_result(&self) -> Option<&ImagePayload> {
        if self.is_batch_mode() {
            return None;
        }
        self.jobs.first().and_then(BatchJob::result)
    }

    fn chain_target(&self, op: &str) -> StudioResult<&ImagePayload> {
        if self.is_batch_mode() {
            return Err(StudioError::invalid_state(format!(
                "{op} is only available for a single image"
            )));
        }
        self.latest_result()
            .ok_or_else(|| StudioError::invalid_state(format!("{op} needs a finished result")))
    }

    fn replace_latest(&mut self, payload: ImagePayload) -> StudioResult<&ImagePayload> {
        let job = self
            .jobs
            .first_mut()
            .filter(|job| job.status() == JobStatus::Done)
            .ok_or_else(|| StudioError::invalid_state("result disappeared"))?;
        job.replace_result(payload);
        job.result()
            .ok_or_else(|| StudioError::invalid_state("result disappeared"))
    }

    /// Re-generates the latest result at a higher resolution. On failure the
    /// previous result stays.
    pub fn upscale_to<G>(&mut self, gateway: &G, resolution: Resolution) -> StudioResult<&ImagePayload>
    where
        G: EditGateway + ?Sized,
    {
        let current = self.chain_target("upscale")?;
        let payload = gateway
            .edit_image(&current.bytes, &current.mime, &resolution.upscale_prompt())
            .map_err(|err| {
                warn!(resolution = resolution.label(), "upscale failed: {err}");
                err
            })?;
        self.replace_latest(payload)
    }

    /// Produces a short clip from the latest result. The image result is
    /// never modified.
    pub fn animate<G>(&mut self, gateway: &G) -> StudioResult<&VideoPayload>
    where
        G: EditGateway + ?Sized,
    {
        let current = self.chain_target("animate")?;
        let (bytes, mime) = (current.bytes.clone(), current.mime.clone());
        self.video = None;
        let video = gateway.generate_video(&bytes, &mime, ANIMATE_PROMPT)?;
        Ok(self.video.insert(video))
    }

    /// Burns the session watermark into the latest result.
    pub fn watermark(&mut self) -> StudioResult<&ImagePayload> {
        let current = self.chain_target("watermark")?;
        let marked = watermark_payload(current, &self.watermark)?;
        self.replace_latest(marked)
    }

    pub fn summary(&self) -> Value {
        json!({
            "tool": self.active_tool.id(),
            "mode": if self.is_batch_mode() { "batch" } else { "single" },
            "images": self.originals.len(),
            "portraits": self.portraits.len(),
            "placements": self.canvas.placements().len(),
            "prompt": self.last_prompt,
            "jobs": self.jobs.iter().map(BatchJob::to_json).collect::<Vec<_>>(),
            "video": self.video.as_ref().map(|v| json!({"mime": v.mime, "bytes": v.bytes.len()})),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composite::FACE_SWAP_INSTRUCTION;
    use crate::error::GatewayError;
    use crate::gateway::scripted::ScriptedGateway;
    use crate::media::fixtures::{png_bytes, portrait, source};
    use crate::tools::EnhancementSettings;

    fn session_on(tool: Tool) -> Session {
        let mut session = Session::new();
        session.switch_tool(tool);
        session
    }

    fn single_restore_session() -> Session {
        let mut session = session_on(Tool::Restore);
        session.upload(vec![source("family.png", 400, 300)]);
        session.add_portrait(portrait("grandpa", 60, 80));
        session.add_portrait(portrait("grandma", 60, 80));
        session
            .load_placements(vec![
                Placement::new("grandpa", 25.0, 40.0),
                Placement::new("grandma", 75.0, 46.0),
            ])
            .unwrap();
        session
    }

    fn result_png() -> ImagePayload {
        ImagePayload::new("image/png", png_bytes(64, 48, [200, 180, 160, 255]))
    }

    #[test]
    fn face_swap_sends_one_composite_with_combined_prompt() {
        let gw = ScriptedGateway::new();
        gw.push_image(Ok(result_png()));
        let mut session = single_restore_session();
        let jobs = session.submit(&gw, |_| {}).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].status(), JobStatus::Done);

        let calls = gw.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].mime, "image/jpeg");
        assert!(calls[0].prompt.starts_with("Restore this old, damaged photograph."));
        assert!(calls[0].prompt.ends_with(FACE_SWAP_INSTRUCTION));
        assert_eq!(session.latest_result(), Some(&result_png()));
    }

    #[test]
    fn face_swap_payload_is_taller_by_margins_and_strip() {
        // no queued reply: the gateway echoes the composite it received
        let gw = ScriptedGateway::new();
        let mut session = single_restore_session().with_layout(CompositeLayout {
            margin: 50,
            strip_height: 120,
        });
        session.submit(&gw, |_| {}).unwrap();
        let sent = session.latest_result().unwrap().decode().unwrap();
        assert_eq!(sent.width(), 400);
        assert!(sent.height() >= 300 + 2 * 50 + 120, "height {}", sent.height());
        assert_eq!(gw.calls()[0].input_len, session.latest_result().unwrap().bytes.len());
    }

    #[test]
    fn batch_mode_ignores_placements_and_uses_plain_prompt() {
        let gw = ScriptedGateway::new();
        let mut session = session_on(Tool::Restore);
        session.upload(vec![source("a.png", 10, 10), source("b.png", 10, 10)]);
        session.add_portrait(portrait("p", 10, 10));
        session
            .load_placements(vec![Placement::new("p", 50.0, 50.0)])
            .unwrap();
        session.submit(&gw, |_| {}).unwrap();
        let calls = gw.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|c| !c.prompt.contains("CRITICAL INSTRUCTION")));
        assert!(calls.iter().all(|c| c.mime == "image/png"));
    }

    #[test]
    fn submit_without_upload_is_invalid() {
        let gw = ScriptedGateway::new();
        let mut session = session_on(Tool::Enhance);
        assert!(matches!(
            session.submit(&gw, |_| {}),
            Err(StudioError::InvalidState(_))
        ));
    }

    #[test]
    fn custom_settings_drive_the_prompt() {
        let gw = ScriptedGateway::new();
        let mut session = session_on(Tool::Enhance);
        session.upload(vec![source("a.png", 10, 10)]);
        session.set_settings(ToolSettings::Enhance(EnhancementSettings {
            level: 80,
            remove_watermark: false,
        }));
        session.submit(&gw, |_| {}).unwrap();
        assert_eq!(gw.calls()[0].prompt, "Enhance this image with level 80.");
    }

    #[test]
    fn failed_upscale_keeps_previous_result() {
        let gw = ScriptedGateway::new();
        gw.push_image(Ok(result_png()))
            .push_image(Err(GatewayError::failure("overloaded")));
        let mut session = single_restore_session();
        session.submit(&gw, |_| {}).unwrap();

        let err = session.upscale_to(&gw, Resolution::K8).unwrap_err();
        assert!(matches!(err, StudioError::Gateway(GatewayError::Failure(_))));
        assert_eq!(session.latest_result(), Some(&result_png()));
        assert_eq!(
            gw.calls()[1].prompt,
            "Upscale this image to a very high resolution, equivalent to 8K."
        );

        // the session is ready for another attempt
        let upscaled = session.upscale_to(&gw, Resolution::K4).unwrap().clone();
        assert_eq!(session.latest_result(), Some(&upscaled));
    }

    #[test]
    fn animate_stores_video_and_leaves_image_alone() {
        let gw = ScriptedGateway::new();
        gw.push_image(Ok(result_png()));
        let mut session = single_restore_session();
        session.submit(&gw, |_| {}).unwrap();
        let video = session.animate(&gw).unwrap().clone();
        assert_eq!(video.mime, "video/mp4");
        assert_eq!(session.video(), Some(&video));
        assert_eq!(session.latest_result(), Some(&result_png()));
        assert_eq!(gw.calls()[1].prompt, ANIMATE_PROMPT);
    }

    #[test]
    fn failed_animation_clears_video_but_keeps_result() {
        let gw = ScriptedGateway::new();
        gw.push_image(Ok(result_png()));
        gw.push_video(Err(GatewayError::Timeout(600)));
        let mut session = single_restore_session();
        session.submit(&gw, |_| {}).unwrap();
        let err = session.animate(&gw).unwrap_err();
        assert!(matches!(err, StudioError::Gateway(GatewayError::Timeout(600))));
        assert!(session.video().is_none());
        assert_eq!(session.latest_result(), Some(&result_png()));
        assert!(session.animate(&gw).is_ok());
    }

    #[test]
    fn watermark_replaces_result_with_png() {
        let gw = ScriptedGateway::new();
        gw.push_image(Ok(result_png()));
        let mut session = single_restore_session();
        session.submit(&gw, |_| {}).unwrap();
        let marked = session.watermark().unwrap().clone();
        assert_eq!(marked.mime, "image/png");
        assert_ne!(marked, result_png());
    }

    #[test]
    fn chained_ops_need_single_done_result() {
        let gw = ScriptedGateway::new();
        let mut session = session_on(Tool::Enhance);
        session.upload(vec![source("a.png", 10, 10)]);
        assert!(matches!(session.watermark(), Err(StudioError::InvalidState(_))));

        gw.push_image(Err(GatewayError::EmptyResponse));
        session.submit(&gw, |_| {}).unwrap();
        assert_eq!(session.jobs()[0].status(), JobStatus::Error);
        assert!(matches!(session.animate(&gw), Err(StudioError::InvalidState(_))));

        session.upload(vec![source("a.png", 10, 10), source("b.png", 10, 10)]);
        session.submit(&gw, |_| {}).unwrap();
        assert!(matches!(
            session.upscale_to(&gw, Resolution::K4),
            Err(StudioError::InvalidState(_))
        ));
    }

    #[test]
    fn tool_switch_discards_placements_and_results() {
        let gw = ScriptedGateway::new();
        let mut session = single_restore_session();
        session.submit(&gw, |_| {}).unwrap();
        session.switch_tool(Tool::BwPhoto);
        assert!(session.canvas().placements().is_empty());
        assert!(session.portraits().is_empty());
        assert!(session.jobs().is_empty());
        assert_eq!(session.originals().len(), 1);
        assert_eq!(session.settings(), Tool::BwPhoto.default_settings());
    }

    #[test]
    fn loaded_placements_must_reference_known_portraits() {
        let mut session = session_on(Tool::Restore);
        session.upload(vec![source("a.png", 10, 10)]);
        session.add_portrait(portrait("p", 10, 10));
        let stray = Placement::new("ghost", 50.0, 50.0);
        assert!(matches!(
            session.load_placements(vec![stray]),
            Err(StudioError::InvalidState(_))
        ));
        let mut wide = Placement::new("p", 120.0, 50.0);
        wide.width = 2.0;
        session.load_placements(vec![wide]).unwrap();
        let loaded = &session.canvas().placements()[0];
        assert_eq!((loaded.x, loaded.width), (100.0, 5.0));
    }

    #[test]
    fn reset_all_drops_uploads_and_settings() {
        let mut session = session_on(Tool::Enhance);
        session.upload(vec![source("a.png", 10, 10)]);
        session.set_settings(ToolSettings::Enhance(EnhancementSettings {
            level: 10,
            remove_watermark: true,
        }));
        session.reset(false);
        assert_eq!(session.originals().len(), 1);
        assert_ne!(session.settings(), Tool::Enhance.default_settings());
        session.reset(true);
        assert!(session.originals().is_empty());
        assert_eq!(session.settings(), Tool::Enhance.default_settings());
    }
}
