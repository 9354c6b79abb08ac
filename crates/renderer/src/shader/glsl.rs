/// Per-frame uniform block shared by every program. Must match `FrameBlock` in `gpu/uniforms.rs`.
pub(crate) const FRAME_BLOCK: &str = r"
layout(std140, set = 0, binding = 0) uniform FrameParams {
    mat4 model;
    mat4 view;
    mat4 projection;
    mat4 normal_matrix;
    mat4 inverse_view_projection;
    vec4 eye;
    // displacement scale, displacement bias, normal scale, roughness
    vec4 shading;
    // metalness, repeat u, repeat v, double sided
    vec4 surface;
    // intensity, show background, has environment, max lod
    vec4 environment;
    // ambient, spot intensity, spot angle, spot penumbra
    vec4 lights;
    vec4 spot_position;
    vec4 background;
} frame;
";

/// Environment bindings plus the helpers that sample them.
pub(crate) const ENVIRONMENT_BLOCK: &str = r"
layout(set = 1, binding = 6) uniform texture2D environment_map;
layout(set = 1, binding = 7) uniform sampler environment_sampler;

const float PI = 3.14159265359;

vec2 equirect_uv(vec3 dir) {
    vec3 d = normalize(dir);
    float u = atan(d.z, d.x) / (2.0 * PI) + 0.5;
    float v = acos(clamp(d.y, -1.0, 1.0)) / PI;
    return vec2(u, v);
}

vec3 sample_environment(vec3 dir, float lod) {
    if (frame.environment.z < 0.5) {
        return vec3(0.0);
    }
    vec3 radiance = textureLod(sampler2D(environment_map, environment_sampler), equirect_uv(dir), lod).rgb;
    return radiance * frame.environment.x;
}

vec3 tone_map(vec3 color) {
    float a = 2.51;
    float b = 0.03;
    float c = 2.43;
    float d = 0.59;
    float e = 0.14;
    return clamp((color * (a * color + b)) / (color * (c * color + d) + e), 0.0, 1.0);
}
";

pub(crate) const PBR_VERTEX: &str = r"
layout(location = 0) in vec3 a_position;
layout(location = 1) in vec3 a_normal;
layout(location = 2) in vec2 a_uv;

layout(location = 0) out vec3 v_world_position;
layout(location = 1) out vec3 v_world_normal;
layout(location = 2) out vec2 v_uv;

layout(set = 1, binding = 4) uniform texture2D displacement_map;
layout(set = 1, binding = 5) uniform sampler material_sampler;

void main() {
    vec2 uv = a_uv * frame.surface.yz;
    vec3 position = a_position;
#ifdef USE_DISPLACEMENT_MAP
    float height = textureLod(sampler2D(displacement_map, material_sampler), vec2(uv.x, 1.0 - uv.y), 0.0).r;
    position += normalize(a_normal) * (height * frame.shading.x + frame.shading.y);
#endif
    vec4 world = frame.model * vec4(position, 1.0);
    v_world_position = world.xyz;
    v_world_normal = normalize((frame.normal_matrix * vec4(a_normal, 0.0)).xyz);
    v_uv = uv;
    gl_Position = frame.projection * frame.view * world;
}
";

/// Base PBR fragment program.
///
/// At the radiance anchor `normal` (after normal mapping), `geometry_normal`
/// (interpolated, flipped for back faces), `view_dir` and `outgoing_radiance`
/// are in scope; snippets may only add to `outgoing_radiance`. Tone mapping and
/// output encoding run after the anchor.
pub(crate) const PBR_FRAGMENT: &str = r"
layout(location = 0) in vec3 v_world_position;
layout(location = 1) in vec3 v_world_normal;
layout(location = 2) in vec2 v_uv;

layout(location = 0) out vec4 out_color;

layout(set = 1, binding = 0) uniform texture2D basecolor_map;
layout(set = 1, binding = 1) uniform texture2D normal_map;
layout(set = 1, binding = 2) uniform texture2D roughness_map;
layout(set = 1, binding = 3) uniform texture2D metalness_map;
layout(set = 1, binding = 5) uniform sampler material_sampler;

layout(std140, set = 2, binding = 0) uniform EffectParams {
    vec4 slots[4];
} effects;

// <insert:declarations>

vec3 perturb_normal(vec3 n, vec3 p, vec2 uv, vec3 mapped) {
    vec3 dp1 = dFdx(p);
    vec3 dp2 = dFdy(p);
    vec2 duv1 = dFdx(uv);
    vec2 duv2 = dFdy(uv);
    vec3 dp2perp = cross(dp2, n);
    vec3 dp1perp = cross(n, dp1);
    vec3 t = dp2perp * duv1.x + dp1perp * duv2.x;
    vec3 b = dp2perp * duv1.y + dp1perp * duv2.y;
    float scale = inversesqrt(max(max(dot(t, t), dot(b, b)), 1e-12));
    mat3 tbn = mat3(t * scale, b * scale, n);
    return normalize(tbn * mapped);
}

vec3 direct_brdf(vec3 n, vec3 v, vec3 l, vec3 diffuse_color, vec3 f0, float roughness) {
    vec3 h = normalize(v + l);
    float n_dot_l = max(dot(n, l), 0.0);
    float n_dot_v = max(dot(n, v), 1e-4);
    float n_dot_h = max(dot(n, h), 0.0);
    float v_dot_h = max(dot(v, h), 0.0);
    float alpha = roughness * roughness;
    float alpha2 = alpha * alpha;
    float denom = n_dot_h * n_dot_h * (alpha2 - 1.0) + 1.0;
    float distribution = alpha2 / (PI * denom * denom);
    float k = (roughness + 1.0) * (roughness + 1.0) / 8.0;
    float geometry = (n_dot_v / (n_dot_v * (1.0 - k) + k)) * (n_dot_l / (n_dot_l * (1.0 - k) + k));
    vec3 fresnel = f0 + (vec3(1.0) - f0) * pow(1.0 - v_dot_h, 5.0);
    vec3 specular = distribution * geometry * fresnel / max(4.0 * n_dot_v * n_dot_l, 1e-4);
    vec3 diffuse = (vec3(1.0) - fresnel) * diffuse_color / PI;
    return (diffuse + specular) * n_dot_l;
}

vec3 environment_brdf(vec3 f0, float roughness, float n_dot_v) {
    vec4 c0 = vec4(-1.0, -0.0275, -0.572, 0.022);
    vec4 c1 = vec4(1.0, 0.0425, 1.04, -0.04);
    vec4 r = roughness * c0 + c1;
    float a004 = min(r.x * r.x, exp2(-9.28 * n_dot_v)) * r.x + r.y;
    vec2 ab = vec2(-1.04, 1.04) * a004 + r.zw;
    return f0 * ab.x + ab.y;
}

void main() {
    vec3 normal = normalize(v_world_normal);
    if (!gl_FrontFacing) {
        if (frame.surface.w < 0.5) {
            discard;
        }
        normal = -normal;
    }
    vec3 geometry_normal = normal;
    vec2 uv = vec2(v_uv.x, 1.0 - v_uv.y);

    vec3 albedo = vec3(1.0);
#ifdef USE_BASECOLOR_MAP
    albedo = texture(sampler2D(basecolor_map, material_sampler), uv).rgb;
#endif
    float roughness = frame.shading.w;
#ifdef USE_ROUGHNESS_MAP
    roughness *= texture(sampler2D(roughness_map, material_sampler), uv).g;
#endif
    float metalness = frame.surface.x;
#ifdef USE_METALNESS_MAP
    metalness *= texture(sampler2D(metalness_map, material_sampler), uv).b;
#endif
    roughness = clamp(roughness, 0.04, 1.0);
    metalness = clamp(metalness, 0.0, 1.0);
#ifdef USE_NORMAL_MAP
    vec3 mapped = texture(sampler2D(normal_map, material_sampler), uv).xyz * 2.0 - 1.0;
    mapped.xy *= frame.shading.z;
    normal = perturb_normal(normal, v_world_position, v_uv, normalize(mapped));
#endif

    vec3 view_dir = normalize(frame.eye.xyz - v_world_position);
    vec3 f0 = mix(vec3(0.04), albedo, metalness);
    vec3 diffuse_color = albedo * (1.0 - metalness);
    float n_dot_v = max(dot(normal, view_dir), 1e-4);

    vec3 light_dir = normalize(frame.spot_position.xyz - v_world_position);
    float cone = dot(light_dir, normalize(frame.spot_position.xyz));
    float outer = cos(frame.lights.z);
    float inner = cos(frame.lights.z * (1.0 - frame.lights.w));
    float spot = smoothstep(outer, max(inner, outer + 1e-4), cone);
    vec3 direct = direct_brdf(normal, view_dir, light_dir, diffuse_color, f0, roughness)
        * frame.lights.y * spot * PI;

    vec3 ambient = diffuse_color * frame.lights.x;

    float max_lod = frame.environment.w;
    vec3 irradiance = sample_environment(normal, max_lod);
    vec3 reflected = sample_environment(reflect(-view_dir, normal), roughness * max_lod);
    vec3 image_based = irradiance * diffuse_color + reflected * environment_brdf(f0, roughness, n_dot_v);

    vec3 outgoing_radiance = direct + ambient + image_based;
    // <insert:radiance>
    out_color = vec4(tone_map(outgoing_radiance), 1.0);
}
";

/// Fullscreen triangle shared by the background and present passes.
pub(crate) const FULLSCREEN_VERTEX: &str = r"#version 450
layout(location = 0) out vec2 v_ndc;

const vec2 positions[3] = vec2[3](
    vec2(-1.0, -3.0),
    vec2(3.0, 1.0),
    vec2(-1.0, 1.0)
);

void main() {
    vec2 pos = positions[uint(gl_VertexIndex)];
    v_ndc = pos;
    gl_Position = vec4(pos, 0.0, 1.0);
}
";

/// Environment drawn behind the mesh, softened by sampling a blurrier mip.
pub(crate) const BACKGROUND_FRAGMENT: &str = r"
layout(location = 0) in vec2 v_ndc;
layout(location = 0) out vec4 out_color;

const float BACKGROUND_BLUR = 0.5;

void main() {
    vec4 far_point = frame.inverse_view_projection * vec4(v_ndc, 1.0, 1.0);
    vec3 dir = far_point.xyz / far_point.w - frame.eye.xyz;
    vec3 radiance = sample_environment(dir, BACKGROUND_BLUR * frame.environment.w);
    out_color = vec4(tone_map(radiance), 1.0);
}
";

/// Copies the offscreen scene onto the swapchain image.
pub(crate) const PRESENT_FRAGMENT: &str = r"#version 450
layout(location = 0) in vec2 v_ndc;
layout(location = 0) out vec4 out_color;

layout(set = 0, binding = 0) uniform texture2D scene_texture;
layout(set = 0, binding = 1) uniform sampler scene_sampler;

void main() {
    vec2 uv = vec2(v_ndc.x * 0.5 + 0.5, 0.5 - v_ndc.y * 0.5);
    vec4 color = texture(sampler2D(scene_texture, scene_sampler), uv);
#ifdef ENCODE_SRGB
    color.rgb = pow(color.rgb, vec3(1.0 / 2.2));
#endif
    out_color = color;
}
";

/// Contact-shadow parameters. Must match `ShadowBlock` in `gpu/shadow.rs`.
pub(crate) const SHADOW_BLOCK: &str = r"
layout(std140, set = 0, binding = 0) uniform ShadowParams {
    mat4 model;
    // world to shadow clip space: x/z across the ground, y up to the far plane
    mat4 shadow_matrix;
    mat4 view_projection;
    // opacity, blur step in uv, plane scale, plane height
    vec4 params;
} shadow;
";

/// Renders the mesh from below; darker where it is closer to the ground.
pub(crate) const SHADOW_CASTER_VERTEX: &str = r"
layout(location = 0) in vec3 a_position;
layout(location = 0) out float v_height;

void main() {
    vec4 clip = shadow.shadow_matrix * shadow.model * vec4(a_position, 1.0);
    v_height = clip.z;
    gl_Position = clip;
}
";

pub(crate) const SHADOW_CASTER_FRAGMENT: &str = r"#version 450
layout(location = 0) in float v_height;
layout(location = 0) out vec4 out_color;

void main() {
    out_color = vec4(0.0, 0.0, 0.0, clamp(1.0 - v_height, 0.0, 1.0));
}
";

/// One axis of a separable gaussian over the shadow target.
pub(crate) const SHADOW_BLUR_FRAGMENT: &str = r"#version 450
layout(location = 0) in vec2 v_ndc;
layout(location = 0) out vec4 out_color;

layout(std140, set = 0, binding = 0) uniform BlurParams {
    vec4 direction;
} blur;
layout(set = 0, binding = 1) uniform texture2D shadow_texture;
layout(set = 0, binding = 2) uniform sampler shadow_sampler;

const float WEIGHTS[5] = float[5](0.227027, 0.1945946, 0.1216216, 0.054054, 0.016216);

void main() {
    vec2 uv = vec2(v_ndc.x * 0.5 + 0.5, 0.5 - v_ndc.y * 0.5);
    vec4 sum = texture(sampler2D(shadow_texture, shadow_sampler), uv) * WEIGHTS[0];
    for (int i = 1; i < 5; ++i) {
        vec2 offset = blur.direction.xy * float(i);
        sum += texture(sampler2D(shadow_texture, shadow_sampler), uv + offset) * WEIGHTS[i];
        sum += texture(sampler2D(shadow_texture, shadow_sampler), uv - offset) * WEIGHTS[i];
    }
    out_color = sum;
}
";

/// Ground quad spanning the shadow area, expanded from the vertex index.
pub(crate) const GROUND_VERTEX: &str = r"
layout(location = 0) out vec3 v_world;

const vec2 corners[6] = vec2[6](
    vec2(-1.0, -1.0),
    vec2(1.0, -1.0),
    vec2(1.0, 1.0),
    vec2(-1.0, -1.0),
    vec2(1.0, 1.0),
    vec2(-1.0, 1.0)
);

void main() {
    vec2 corner = corners[uint(gl_VertexIndex)] * shadow.params.z * 0.5;
    v_world = vec3(corner.x, shadow.params.w, corner.y);
    gl_Position = shadow.view_projection * vec4(v_world, 1.0);
}
";

pub(crate) const GROUND_FRAGMENT: &str = r"
layout(location = 0) in vec3 v_world;
layout(location = 0) out vec4 out_color;

layout(set = 0, binding = 1) uniform texture2D shadow_texture;
layout(set = 0, binding = 2) uniform sampler shadow_sampler;

void main() {
    vec4 clip = shadow.shadow_matrix * vec4(v_world, 1.0);
    vec2 uv = vec2(clip.x * 0.5 + 0.5, 0.5 - clip.y * 0.5);
    float darkness = texture(sampler2D(shadow_texture, shadow_sampler), uv).a;
    out_color = vec4(0.0, 0.0, 0.0, darkness * shadow.params.x);
}
";
