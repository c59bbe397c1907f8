//! Walks the photo, video and audio capture dialogs against the virtual
//! platform and prints what a UI would render.
//!
//! ```text
//! capture-demo [photo|video|audio] [--segment-ms 250] [--amplitude 0.8]
//! ```

use std::fmt;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use media_capture_core::{CaptureEngine, CaptureError, CaptureOptions, CaptureStatus, EngineState};
use media_capture_virtual::{Permission, VirtualPlatform};

const STEP_TIMEOUT: Duration = Duration::from_secs(10);

/// Capture dialog walkthrough against virtual devices
#[derive(Parser, Debug)]
#[command(name = "capture-demo")]
#[command(version)]
#[command(about = "Walk the capture dialogs against a virtual camera and microphone")]
struct Args {
    /// Dialog to walk; all of them when omitted
    #[arg(value_enum)]
    flow: Option<Flow>,

    /// Recorder timeslice for the video dialog
    #[arg(long, value_name = "MS", default_value_t = 250)]
    segment_ms: u64,

    /// Microphone tone amplitude for the audio dialog (0.0 to 1.0)
    #[arg(long, value_name = "LEVEL", default_value_t = 0.8)]
    amplitude: f32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Flow {
    Photo,
    Video,
    Audio,
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_possible_value() {
            Some(value) => f.write_str(value.get_name()),
            None => Ok(()),
        }
    }
}

impl Flow {
    fn options(&self, args: &Args) -> CaptureOptions {
        match self {
            Self::Photo => CaptureOptions::photo(),
            Self::Video => CaptureOptions {
                segment_duration: Some(Duration::from_millis(args.segment_ms.max(1))),
                ..CaptureOptions::video()
            },
            Self::Audio => CaptureOptions::audio(),
        }
    }
}

/// One line per observed state, as a status bar would show it.
fn render(state: &EngineState) -> String {
    let status = state.status.map_or("-", |s| s.as_str());
    let mut line = format!("[r{:>3}] {:<11} active={}", state.revision, status, state.active);
    if let Some(id) = &state.chosen_device_id {
        let label = state
            .devices
            .iter()
            .find(|d| &d.id == id)
            .map_or(id.as_str(), |d| d.label.as_str());
        line.push_str(&format!(" device=\"{}\"", label));
    }
    if let Some(input) = &state.live_video {
        let (width, height) = input.fit_within(640, 480);
        line.push_str(&format!(" preview={}x{}", width, height));
    }
    if let Some(volume) = state.volume {
        line.push_str(&format!(" volume={:>3}", volume));
    }
    if state.status.is_some_and(|s| s.is_recording()) {
        line.push_str(" REC");
    }
    if let Some(ms) = state.duration_ms {
        line.push_str(&format!(" t={:.1}s", ms as f64 / 1000.0));
    }
    if let Some(error) = &state.last_error {
        line.push_str(&format!(" error=\"{}\"", error));
    }
    line
}

async fn wait_for(engine: &CaptureEngine<VirtualPlatform>, status: CaptureStatus) -> Result<EngineState, CaptureError> {
    let wait = async {
        loop {
            let state = engine.snapshot();
            if state.is(status) {
                return Ok(state);
            }
            if state.is(CaptureStatus::Denied) {
                return Err(state.last_error.unwrap_or(CaptureError::PermissionDenied(String::new())));
            }
            engine.await_change_since(state.revision).await;
        }
    };
    tokio::time::timeout(STEP_TIMEOUT, wait)
        .await
        .map_err(|_| CaptureError::Unknown(format!("timed out waiting for {}", status)))?
}

async fn run(flow: Flow, args: &Args) -> Result<(), CaptureError> {
    println!("== {} ==", flow);

    let platform = Arc::new(VirtualPlatform::with_default_devices());
    platform.set_permission(Permission::Prompt);
    let engine = CaptureEngine::new(Arc::clone(&platform), flow.options(args))?;

    let observer = {
        let engine = engine.clone();
        tokio::spawn(async move {
            loop {
                let state = engine.await_change().await;
                println!("{}", render(&state));
            }
        })
    };

    engine.activate()?;
    wait_for(&engine, CaptureStatus::Previewing).await?;

    match flow {
        Flow::Photo => {
            let still = engine.snap().await?;
            log::info!("still at {}", still.url);
        }
        Flow::Video => {
            engine.start()?;
            tokio::time::sleep(Duration::from_millis(1200)).await;
            engine.pause()?;
            tokio::time::sleep(Duration::from_millis(400)).await;
            engine.resume()?;
            tokio::time::sleep(Duration::from_millis(600)).await;
            engine.stop()?;
        }
        Flow::Audio => {
            platform.set_tone_amplitude(args.amplitude);
            engine.start()?;
            tokio::time::sleep(Duration::from_millis(1000)).await;
            engine.stop()?;
        }
    }
    let captured = wait_for(&engine, CaptureStatus::Captured).await?;

    let media = engine.extract();
    let summary = serde_json::json!({
        "flow": flow.to_string(),
        "state": captured.to_json(),
        "media": media,
    });
    match serde_json::to_string_pretty(&summary) {
        Ok(json) => println!("{}", json),
        Err(e) => log::warn!("could not serialize summary: {}", e),
    }

    for artifact in captured.artifacts() {
        engine.revoke_url(&artifact.url);
    }
    engine.deactivate();
    observer.abort();
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let flows = match args.flow {
        Some(flow) => vec![flow],
        None => Flow::value_variants().to_vec(),
    };

    for flow in flows {
        if let Err(e) = run(flow, &args).await {
            eprintln!("{} flow failed: {}", flow, e);
            return ExitCode::FAILURE;
        }
    }
    ExitCode::SUCCESS
}
