//! Surface materials written into the G-buffer

use glam::Vec4;

use crate::backend::{GraphicsBackend, ShaderHandle, TextureHandle};

/// PBR material properties
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    pub albedo: Vec4,
    pub metallic: f32,
    pub roughness: f32,
    /// Written to the single-channel emissive attachment
    pub emissive: f32,
    /// Skips lighting in the shading pass
    pub unlit: bool,
    /// Drawn in the translucent group, without depth writes
    pub transparent: bool,

    pub albedo_texture: Option<TextureHandle>,
    pub normal_texture: Option<TextureHandle>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            albedo: Vec4::ONE,
            metallic: 0.0,
            roughness: 0.5,
            emissive: 0.0,
            unlit: false,
            transparent: false,
            albedo_texture: None,
            normal_texture: None,
        }
    }
}

impl Material {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_albedo(mut self, albedo: Vec4) -> Self {
        self.albedo = albedo;
        self
    }

    pub fn with_metallic(mut self, metallic: f32) -> Self {
        self.metallic = metallic;
        self
    }

    pub fn with_roughness(mut self, roughness: f32) -> Self {
        self.roughness = roughness;
        self
    }

    pub fn with_emissive(mut self, emissive: f32) -> Self {
        self.emissive = emissive;
        self
    }

    pub fn with_albedo_texture(mut self, texture: TextureHandle) -> Self {
        self.albedo_texture = Some(texture);
        self
    }

    pub fn with_normal_texture(mut self, texture: TextureHandle) -> Self {
        self.normal_texture = Some(texture);
        self
    }

    pub fn unlit(mut self) -> Self {
        self.unlit = true;
        self
    }

    pub fn transparent(mut self) -> Self {
        self.transparent = true;
        self
    }

    /// Write this material's uniforms and textures into `shader`
    pub fn bind<B: GraphicsBackend + ?Sized>(&self, backend: &mut B, shader: ShaderHandle) {
        backend.set_uniform(shader, "u_Albedo", self.albedo.into());
        backend.set_uniform(shader, "u_Metallic", self.metallic.into());
        backend.set_uniform(shader, "u_Roughness", self.roughness.into());
        backend.set_uniform(shader, "u_Emissive", self.emissive.into());
        backend.set_uniform(shader, "u_Unlit", self.unlit.into());
        backend.set_uniform(
            shader,
            "u_HasAlbedoTexture",
            self.albedo_texture.is_some().into(),
        );
        backend.set_uniform(
            shader,
            "u_HasNormalTexture",
            self.normal_texture.is_some().into(),
        );
        if let Some(texture) = self.albedo_texture {
            backend.bind_texture(shader, "u_AlbedoTexture", texture);
        }
        if let Some(texture) = self.normal_texture {
            backend.bind_texture(shader, "u_NormalTexture", texture);
        }
    }

    // Preset materials

    pub fn plastic(albedo: Vec4) -> Self {
        Self::new("plastic")
            .with_albedo(albedo)
            .with_roughness(0.4)
    }

    pub fn metal(albedo: Vec4, roughness: f32) -> Self {
        Self::new("metal")
            .with_albedo(albedo)
            .with_metallic(1.0)
            .with_roughness(roughness)
    }

    pub fn glass() -> Self {
        Self::new("glass")
            .with_albedo(Vec4::new(1.0, 1.0, 1.0, 0.3))
            .with_roughness(0.1)
            .transparent()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{RecordingBackend, ShaderDescriptor, UniformValue};

    #[test]
    fn test_bind_writes_uniforms() {
        let mut backend = RecordingBackend::new();
        let shader = backend
            .create_shader(&ShaderDescriptor::new("gbuffer", ""))
            .unwrap();

        Material::metal(Vec4::new(1.0, 0.5, 0.25, 1.0), 0.3).bind(&mut backend, shader);

        assert_eq!(
            backend.uniform(shader, "u_Metallic"),
            Some(UniformValue::Float(1.0))
        );
        assert_eq!(
            backend.uniform(shader, "u_HasAlbedoTexture"),
            Some(UniformValue::Int(0))
        );
        assert_eq!(backend.bound_texture(shader, "u_AlbedoTexture"), None);
    }
}
