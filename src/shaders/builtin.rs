//! Compositing shaders shipped with the renderer

use crate::backend::{
    ShaderDescriptor, TextureBinding, TextureSampleType, UniformField, UniformType,
};

use super::names;

/// Fullscreen triangle vertex stage shared by every post-process shader
pub const FULLSCREEN_VERTEX_SHADER: &str = r#"
struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> VertexOutput {
    var output: VertexOutput;

    // Generate fullscreen triangle
    let x = f32((vertex_index << 1u) & 2u);
    let y = f32(vertex_index & 2u);

    output.position = vec4<f32>(x * 2.0 - 1.0, y * 2.0 - 1.0, 0.0, 1.0);
    output.uv = vec2<f32>(x, 1.0 - y);

    return output;
}
"#;

const COPY_FRAGMENT: &str = r#"
@group(1) @binding(0) var u_Source: texture_2d<f32>;
@group(1) @binding(1) var u_SourceSampler: sampler;

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    return textureSample(u_Source, u_SourceSampler, input.uv);
}
"#;

const ADD_FRAGMENT: &str = r#"
@group(1) @binding(0) var u_Source: texture_2d<f32>;
@group(1) @binding(1) var u_SourceSampler: sampler;
@group(1) @binding(2) var u_Source2: texture_2d<f32>;
@group(1) @binding(3) var u_Source2Sampler: sampler;

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let a = textureSample(u_Source, u_SourceSampler, input.uv);
    let b = textureSample(u_Source2, u_Source2Sampler, input.uv);
    return vec4<f32>(a.rgb + b.rgb, 1.0);
}
"#;

const COMBINE_FRAGMENT: &str = r#"
@group(1) @binding(0) var u_Source: texture_2d<f32>;
@group(1) @binding(1) var u_SourceSampler: sampler;
@group(1) @binding(2) var u_Source2: texture_2d<f32>;
@group(1) @binding(3) var u_Source2Sampler: sampler;

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let a = textureSample(u_Source, u_SourceSampler, input.uv);
    let b = textureSample(u_Source2, u_Source2Sampler, input.uv);
    return vec4<f32>(mix(a.rgb, b.rgb, clamp(b.a, 0.0, 1.0)), 1.0);
}
"#;

const TONEMAP_FRAGMENT: &str = r#"
struct Uniforms {
    u_Exposure: f32,
    u_Gamma: f32,
}

@group(0) @binding(0) var<uniform> uniforms: Uniforms;
@group(1) @binding(0) var u_Source: texture_2d<f32>;
@group(1) @binding(1) var u_SourceSampler: sampler;

fn aces_tonemap(color: vec3<f32>) -> vec3<f32> {
    let a = 2.51;
    let b = 0.03;
    let c = 2.43;
    let d = 0.59;
    let e = 0.14;
    return saturate((color * (a * color + b)) / (color * (c * color + d) + e));
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let color = textureSample(u_Source, u_SourceSampler, input.uv).rgb * uniforms.u_Exposure;
    let mapped = aces_tonemap(color);
    let gamma = max(uniforms.u_Gamma, 0.001);
    return vec4<f32>(pow(mapped, vec3<f32>(1.0 / gamma)), 1.0);
}
"#;

const VIGNETTE_FRAGMENT: &str = r#"
struct Uniforms {
    u_Intensity: f32,
    u_Extend: f32,
}

@group(0) @binding(0) var<uniform> uniforms: Uniforms;
@group(1) @binding(0) var u_Source: texture_2d<f32>;
@group(1) @binding(1) var u_SourceSampler: sampler;

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let color = textureSample(u_Source, u_SourceSampler, input.uv);
    let edge = input.uv * (vec2<f32>(1.0) - input.uv.yx);
    let falloff = clamp(edge.x * edge.y * uniforms.u_Intensity, 0.0, 1.0);
    // extend 0 leaves the image untouched
    let vignette = pow(falloff, uniforms.u_Extend);
    return vec4<f32>(color.rgb * vignette, color.a);
}
"#;

const BARREL_DISTORTION_FRAGMENT: &str = r#"
struct Uniforms {
    u_Distortion: f32,
    u_DistortionEdge: f32,
    u_Scale: f32,
}

@group(0) @binding(0) var<uniform> uniforms: Uniforms;
@group(1) @binding(0) var u_Source: texture_2d<f32>;
@group(1) @binding(1) var u_SourceSampler: sampler;

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let centered = input.uv - vec2<f32>(0.5);
    let r2 = dot(centered, centered);
    let factor = 1.0 + r2 * (uniforms.u_Distortion + uniforms.u_DistortionEdge * sqrt(r2));
    let uv = centered * factor * uniforms.u_Scale + vec2<f32>(0.5);
    let color = textureSample(u_Source, u_SourceSampler, clamp(uv, vec2<f32>(0.0), vec2<f32>(1.0)));
    if (any(uv < vec2<f32>(0.0)) || any(uv > vec2<f32>(1.0))) {
        return vec4<f32>(0.0, 0.0, 0.0, 1.0);
    }
    return color;
}
"#;

const DISPLAY_DEPTH_FRAGMENT: &str = r#"
@group(1) @binding(0) var u_Source: texture_depth_2d;

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let depth = textureLoad(u_Source, vec2<i32>(input.position.xy), 0);
    let shade = pow(depth, 64.0);
    return vec4<f32>(vec3<f32>(shade), 1.0);
}
"#;

const OUTLINE_FRAGMENT: &str = r#"
struct Uniforms {
    u_OutlineColor: vec4<f32>,
    u_EntityID: i32,
    u_Radius: f32,
}

@group(0) @binding(0) var<uniform> uniforms: Uniforms;
@group(1) @binding(0) var u_EntityTexture: texture_2d<i32>;

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    // 0 marks pixels without an entity, so nothing is selected
    if (uniforms.u_EntityID == 0) {
        return vec4<f32>(0.0);
    }
    let size = vec2<i32>(textureDimensions(u_EntityTexture));
    let center = vec2<i32>(input.position.xy);
    if (textureLoad(u_EntityTexture, center, 0).r == uniforms.u_EntityID) {
        return vec4<f32>(0.0);
    }
    let radius = max(i32(uniforms.u_Radius), 1);
    for (var y = -radius; y <= radius; y += 1) {
        for (var x = -radius; x <= radius; x += 1) {
            let p = clamp(center + vec2<i32>(x, y), vec2<i32>(0), size - vec2<i32>(1));
            if (textureLoad(u_EntityTexture, p, 0).r == uniforms.u_EntityID) {
                return uniforms.u_OutlineColor;
            }
        }
    }
    return vec4<f32>(0.0);
}
"#;

fn fullscreen(label: &str, fragment: &str) -> ShaderDescriptor {
    ShaderDescriptor::new(label, &format!("{}{}", FULLSCREEN_VERTEX_SHADER, fragment))
}

/// Descriptors for every built-in shader, keyed by logical name
pub fn builtin_shaders() -> Vec<(&'static str, ShaderDescriptor)> {
    vec![
        (
            names::COPY,
            fullscreen("Copy", COPY_FRAGMENT).with_texture(TextureBinding::color("u_Source")),
        ),
        (
            names::ADD,
            fullscreen("Add", ADD_FRAGMENT)
                .with_texture(TextureBinding::color("u_Source"))
                .with_texture(TextureBinding::color("u_Source2")),
        ),
        (
            names::COMBINE,
            fullscreen("Combine", COMBINE_FRAGMENT)
                .with_texture(TextureBinding::color("u_Source"))
                .with_texture(TextureBinding::color("u_Source2")),
        ),
        (
            names::TONEMAP,
            fullscreen("Tonemap", TONEMAP_FRAGMENT)
                .with_uniform(UniformField::new("u_Exposure", UniformType::Float))
                .with_uniform(UniformField::new("u_Gamma", UniformType::Float))
                .with_texture(TextureBinding::color("u_Source")),
        ),
        (
            names::VIGNETTE,
            fullscreen("Vignette", VIGNETTE_FRAGMENT)
                .with_uniform(UniformField::new("u_Intensity", UniformType::Float))
                .with_uniform(UniformField::new("u_Extend", UniformType::Float))
                .with_texture(TextureBinding::color("u_Source")),
        ),
        (
            names::BARREL_DISTORTION,
            fullscreen("Barrel Distortion", BARREL_DISTORTION_FRAGMENT)
                .with_uniform(UniformField::new("u_Distortion", UniformType::Float))
                .with_uniform(UniformField::new("u_DistortionEdge", UniformType::Float))
                .with_uniform(UniformField::new("u_Scale", UniformType::Float))
                .with_texture(TextureBinding::color("u_Source")),
        ),
        (
            names::DISPLAY_DEPTH,
            fullscreen("Display Depth", DISPLAY_DEPTH_FRAGMENT)
                .with_texture(TextureBinding::new("u_Source", TextureSampleType::Depth)),
        ),
        (
            names::OUTLINE,
            fullscreen("Outline", OUTLINE_FRAGMENT)
                .with_uniform(UniformField::new("u_OutlineColor", UniformType::Vec4))
                .with_uniform(UniformField::new("u_EntityID", UniformType::Int))
                .with_uniform(UniformField::new("u_Radius", UniformType::Float))
                .with_texture(TextureBinding::new(
                    "u_EntityTexture",
                    TextureSampleType::Sint,
                )),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_sources_have_both_stages() {
        for (name, desc) in builtin_shaders() {
            assert!(desc.source.contains("fn vs_main"), "{} has no vertex stage", name);
            assert!(desc.source.contains("fn fs_main"), "{} has no fragment stage", name);
        }
    }

    #[test]
    fn test_declared_bindings_appear_in_source() {
        for (name, desc) in builtin_shaders() {
            for texture in &desc.textures {
                assert!(desc.source.contains(&texture.name), "{}: {}", name, texture.name);
            }
            for uniform in &desc.uniforms {
                assert!(desc.source.contains(&uniform.name), "{}: {}", name, uniform.name);
            }
        }
    }
}
