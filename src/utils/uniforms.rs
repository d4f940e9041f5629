use chrono::{Datelike, Local, Timelike};

/// Shader uniforms structure
///
/// Mirrors the scaffold's `ShaderInputs` block under std140 rules: the vec3
/// packs with the three scalars after it, and `iMouse` starts on a 16-byte
/// boundary.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ShaderUniforms {
    pub resolution: [f32; 3],
    pub time: f32,
    pub time_delta: f32,
    pub frame: i32,
    pub _pad0: [f32; 2],
    pub mouse: [f32; 4],
    /// Year, month (0-based), day, seconds since midnight
    pub date: [f32; 4],
}

impl ShaderUniforms {
    /// Uniforms for a still frame at a fixed logical time
    pub fn at_time(width: u32, height: u32, time: f32) -> Self {
        Self {
            resolution: [width as f32, height as f32, 1.0],
            time,
            time_delta: 1.0 / 60.0,
            frame: (time * 60.0) as i32,
            _pad0: [0.0; 2],
            mouse: [0.0; 4],
            date: current_date(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

fn current_date() -> [f32; 4] {
    let now = Local::now();
    [
        now.year() as f32,
        now.month0() as f32,
        now.day() as f32,
        now.num_seconds_from_midnight() as f32 + now.nanosecond() as f32 / 1e9,
    ]
}
