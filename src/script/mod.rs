//! VapourSynth restoration script generation.
//!
//! Each job gets a throwaway `.vpy` script next to its input. The script
//! loads the source through ffms2 at a forced broadcast frame rate, lifts
//! it to 16-bit 4:2:0 and runs QTGMC with the configured parameters.

mod hardware;

pub use hardware::{HardwareSettings, AUTO_RAM_CACHE_MB};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use autovhs_av::MediaProbe;

use crate::config::{DeinterlaceConfig, DeinterlaceMode, FieldOrder, TvStandard};
use crate::pipeline::{PipelineError, Result};

/// Writes the frame-generator script for one input.
#[async_trait]
pub trait ScriptGenerator: Send + Sync {
    async fn generate(&self, input: &Path, script_path: &Path, mode: DeinterlaceMode)
        -> Result<()>;
}

/// Broadcast frame rate forced on the source, as `fpsnum/fpsden`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameRate {
    /// 25/1
    Pal,
    /// 30000/1001
    Ntsc,
}

impl FrameRate {
    pub fn fraction(self) -> (u32, u32) {
        match self {
            FrameRate::Pal => (25, 1),
            FrameRate::Ntsc => (30000, 1001),
        }
    }

    /// PAL when `fps` is within half a frame of 25, NTSC otherwise.
    pub fn from_probed(fps: f64) -> Self {
        if (fps - 25.0).abs() < 0.5 {
            FrameRate::Pal
        } else {
            FrameRate::Ntsc
        }
    }
}

/// Generates QTGMC scripts from the deinterlace and performance settings.
pub struct VapourSynthScript {
    deinterlace: DeinterlaceConfig,
    hardware: HardwareSettings,
    probe: Arc<dyn MediaProbe>,
}

impl VapourSynthScript {
    pub fn new(
        deinterlace: DeinterlaceConfig,
        hardware: HardwareSettings,
        probe: Arc<dyn MediaProbe>,
    ) -> Self {
        Self {
            deinterlace,
            hardware,
            probe,
        }
    }

    async fn frame_rate(&self, input: &Path) -> FrameRate {
        match self.deinterlace.tv_standard {
            TvStandard::Pal => FrameRate::Pal,
            TvStandard::Ntsc => FrameRate::Ntsc,
            TvStandard::Auto => {
                let fps = self.probe.fps(input).await;
                let rate = FrameRate::from_probed(fps);
                tracing::info!("Detected {:.3} fps, using {:?} timing", fps, rate);
                rate
            }
        }
    }
}

#[async_trait]
impl ScriptGenerator for VapourSynthScript {
    async fn generate(
        &self,
        input: &Path,
        script_path: &Path,
        mode: DeinterlaceMode,
    ) -> Result<()> {
        let source = std::path::absolute(input).unwrap_or_else(|_| input.to_path_buf());
        let rate = self.frame_rate(input).await;
        let script = render_script(&source, mode, rate, &self.deinterlace, &self.hardware);

        tokio::fs::write(script_path, script.as_bytes())
            .await
            .map_err(|source| PipelineError::Script {
                path: PathBuf::from(script_path),
                source,
            })?;

        tracing::debug!(
            "Wrote {} script for {} to {} ({} bytes)",
            mode,
            source.display(),
            script_path.display(),
            script.len()
        );
        Ok(())
    }
}

/// Render the script text.
pub fn render_script(
    source: &Path,
    mode: DeinterlaceMode,
    rate: FrameRate,
    deinterlace: &DeinterlaceConfig,
    hardware: &HardwareSettings,
) -> String {
    let mut lines = vec!["import sys".to_string()];
    for path in &deinterlace.python_paths {
        lines.push(format!("sys.path.append({})", py_str(&path.to_string_lossy())));
    }
    lines.push("import vapoursynth as vs".to_string());
    lines.push("import havsfunc as haf".to_string());
    lines.push("core = vs.core".to_string());
    lines.push(String::new());

    lines.push(format!("core.num_threads = {}", hardware.cpu_threads));
    lines.push(format!("core.max_cache_size = {}", hardware.ram_cache_mb));
    lines.push(String::new());

    for plugin in &deinterlace.plugins {
        lines.push(format!(
            "try:\n    core.std.LoadPlugin({})\nexcept Exception:\n    pass",
            py_str(&plugin.to_string_lossy())
        ));
    }
    lines.push("if hasattr(core, 'eedi3') and not hasattr(core, 'eedi3m'):".to_string());
    lines.push("    core.eedi3m = core.eedi3".to_string());
    lines.push(String::new());

    let (fps_num, fps_den) = rate.fraction();
    lines.push(format!(
        "clip = core.ffms2.Source({}, fpsnum={}, fpsden={})",
        py_str(&source.to_string_lossy()),
        fps_num,
        fps_den
    ));
    lines.push("clip = core.resize.Point(clip, format=vs.YUV420P16)".to_string());
    lines.push(String::new());

    match mode {
        DeinterlaceMode::Qtgmc => lines.push(qtgmc_call(deinterlace, hardware)),
    }
    lines.push("clip.set_output()".to_string());

    let mut script = lines.join("\n");
    script.push('\n');
    script
}

fn qtgmc_call(deinterlace: &DeinterlaceConfig, hardware: &HardwareSettings) -> String {
    let q = &deinterlace.qtgmc;
    let tff = match deinterlace.field_order {
        FieldOrder::Tff => "True",
        FieldOrder::Bff => "False",
    };

    let mut args = vec![
        format!("Preset={}", py_str(&q.preset)),
        "InputType=0".to_string(),
        format!("TFF={}", tff),
        format!("SourceMatch={}", q.source_match),
        format!("Lossless={}", q.lossless),
        "TR2=3".to_string(),
        format!("EZDenoise={:?}", q.ez_denoise),
        format!("NoiseProcess={}", q.noise_process),
        format!("Sharpness={:?}", q.sharpness),
        "FPSDivisor=1".to_string(),
    ];
    if hardware.use_gpu_opencl {
        args.push("EdiMode='NNEDI3CL'".to_string());
    }

    format!("clip = haf.QTGMC(clip, {})", args.join(", "))
}

/// Quote `s` as a single-quoted Python string literal.
fn py_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}
