//! Per-scene rendering settings
//!
//! Every optional effect has an `enabled` toggle and a notion of neutral
//! parameters. An effect only runs when it is enabled and not neutral, so turning
//! it off and zeroing its strength render the same frame.

use glam::{Vec3, Vec4};

/// What fills pixels not covered by geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SkyMode {
    #[default]
    Procedural,
    /// Clear to the ambient color
    ClearColor,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProceduralSky {
    /// Direction sunlight travels
    pub sun_direction: Vec3,
    pub sun_intensity: f32,
}

impl Default for ProceduralSky {
    fn default() -> Self {
        Self {
            sun_direction: Vec3::new(0.2, -1.0, 0.3).normalize(),
            sun_intensity: 1.0,
        }
    }
}

/// Selection outline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlineSettings {
    pub color: Vec4,
    /// Pixels at resolution scale 1
    pub radius: f32,
}

impl Default for OutlineSettings {
    fn default() -> Self {
        Self {
            color: Vec4::new(1.0, 0.6, 0.1, 1.0),
            radius: 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SsaoSettings {
    pub enabled: bool,
    pub radius: f32,
    pub bias: f32,
    pub area: f32,
    pub falloff: f32,
    pub strength: f32,
}

impl Default for SsaoSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            radius: 0.5,
            bias: 0.025,
            area: 0.0075,
            falloff: 0.002,
            strength: 2.0,
        }
    }
}

impl SsaoSettings {
    pub fn is_neutral(&self) -> bool {
        self.strength == 0.0
    }

    pub fn is_requested(&self) -> bool {
        self.enabled && !self.is_neutral()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BloomSettings {
    pub enabled: bool,
    pub threshold: f32,
    pub intensity: f32,
    /// Downsample steps, capped by the renderer configuration
    pub iterations: u32,
}

impl Default for BloomSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 2.4,
            intensity: 0.5,
            iterations: 4,
        }
    }
}

impl BloomSettings {
    pub fn is_neutral(&self) -> bool {
        self.intensity == 0.0 || self.iterations == 0
    }

    pub fn is_requested(&self) -> bool {
        self.enabled && !self.is_neutral()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumetricSettings {
    pub enabled: bool,
    pub fog_amount: f32,
    pub step_count: u32,
}

impl Default for VolumetricSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            fog_amount: 0.5,
            step_count: 50,
        }
    }
}

impl VolumetricSettings {
    /// Also neutral when no directional light is volumetric and casts shadows
    pub fn is_neutral(&self) -> bool {
        self.fog_amount == 0.0 || self.step_count == 0
    }

    pub fn is_requested(&self) -> bool {
        self.enabled && !self.is_neutral()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SsrSettings {
    pub enabled: bool,
    pub strength: f32,
    pub ray_step: f32,
    pub max_steps: u32,
    pub thickness: f32,
}

impl Default for SsrSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            strength: 1.0,
            ray_step: 0.2,
            max_steps: 30,
            thickness: 0.5,
        }
    }
}

impl SsrSettings {
    pub fn is_neutral(&self) -> bool {
        self.strength == 0.0
    }

    pub fn is_requested(&self) -> bool {
        self.enabled && !self.is_neutral()
    }
}

/// Depth of field. Always drawn; `enabled` only decides whether later stages
/// read its output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DofSettings {
    pub enabled: bool,
    pub focal_depth: f32,
    pub focal_length: f32,
    pub f_stop: f32,
    pub show_focus: bool,
    pub auto_focus: bool,
    pub manual_focus: bool,
    pub samples: i32,
    pub rings: i32,
    /// Near and far blur start, shared by both ranges
    pub start: f32,
    /// Near and far blur falloff distance
    pub distance: f32,
    pub coc: f32,
    pub max_blur: f32,
    pub threshold: f32,
    pub gain: f32,
    pub bias: f32,
    pub fringe: f32,
    pub noise_amount: f32,
    pub blur_size: f32,
    pub feather: f32,
}

impl Default for DofSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            focal_depth: 1.0,
            focal_length: 16.0,
            f_stop: 2.8,
            show_focus: false,
            auto_focus: true,
            manual_focus: false,
            samples: 3,
            rings: 3,
            start: 1.0,
            distance: 2.0,
            coc: 0.03,
            max_blur: 1.0,
            threshold: 0.5,
            gain: 2.0,
            bias: 0.5,
            fringe: 0.7,
            noise_amount: 0.0001,
            blur_size: 1.25,
            feather: 0.4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarrelDistortionSettings {
    pub enabled: bool,
    pub distortion: f32,
    pub edge_distortion: f32,
    pub scale: f32,
}

impl Default for BarrelDistortionSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            distortion: 0.0,
            edge_distortion: 0.0,
            scale: 1.0,
        }
    }
}

impl BarrelDistortionSettings {
    pub fn is_neutral(&self) -> bool {
        self.distortion == 0.0 && self.edge_distortion == 0.0 && self.scale == 1.0
    }

    pub fn is_requested(&self) -> bool {
        self.enabled && !self.is_neutral()
    }
}

/// Vignette always runs; disabled means an extend of 0
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VignetteSettings {
    pub enabled: bool,
    pub intensity: f32,
    pub extend: f32,
}

impl Default for VignetteSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            intensity: 15.0,
            extend: 0.25,
        }
    }
}

impl VignetteSettings {
    pub fn effective_extend(&self) -> f32 {
        if self.enabled {
            self.extend
        } else {
            0.0
        }
    }
}

/// Rendering settings of one scene
#[derive(Debug, Clone, PartialEq)]
pub struct SceneEnvironment {
    pub sky: SkyMode,
    pub procedural_sky: ProceduralSky,
    pub ambient_color: Vec4,
    pub ambient_term: f32,
    pub exposure: f32,
    pub gamma: f32,
    pub outline: OutlineSettings,
    pub ssao: SsaoSettings,
    pub bloom: BloomSettings,
    pub volumetric: VolumetricSettings,
    pub ssr: SsrSettings,
    pub dof: DofSettings,
    pub barrel_distortion: BarrelDistortionSettings,
    pub vignette: VignetteSettings,
}

impl Default for SceneEnvironment {
    fn default() -> Self {
        Self {
            sky: SkyMode::Procedural,
            procedural_sky: ProceduralSky::default(),
            ambient_color: Vec4::new(0.05, 0.05, 0.08, 1.0),
            ambient_term: 0.25,
            exposure: 1.0,
            gamma: 2.2,
            outline: OutlineSettings::default(),
            ssao: SsaoSettings::default(),
            bloom: BloomSettings::default(),
            volumetric: VolumetricSettings::default(),
            ssr: SsrSettings::default(),
            dof: DofSettings::default(),
            barrel_distortion: BarrelDistortionSettings::default(),
            vignette: VignetteSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neutral_parameters() {
        let mut ssao = SsaoSettings {
            strength: 0.0,
            ..Default::default()
        };
        assert!(ssao.enabled && !ssao.is_requested());
        ssao.strength = 1.0;
        assert!(ssao.is_requested());

        let barrel = BarrelDistortionSettings {
            enabled: true,
            ..Default::default()
        };
        assert!(!barrel.is_requested());
        let barrel = BarrelDistortionSettings {
            scale: 1.1,
            ..barrel
        };
        assert!(barrel.is_requested());
    }

    #[test]
    fn test_disabled_vignette_has_no_extend() {
        let vignette = VignetteSettings {
            enabled: false,
            extend: 0.8,
            ..Default::default()
        };
        assert_eq!(vignette.effective_extend(), 0.0);
    }
}
