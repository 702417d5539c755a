//! WGSL sources for every device kernel.
//!
//! Each kernel is its own module with a single `main` entry point (the scan
//! module has two), so pipelines can use the layout naga derives from the
//! bindings. The shared prelude mirrors the `#[repr(C)]` structs in
//! [`config`](crate::config), [`pool`](crate::pool) and
//! [`emission`](crate::emission).

use crate::spatial::GRID_WGSL;

/// Structs, constants and slot helpers shared by the particle kernels.
pub const COMMON_WGSL: &str = r#"
struct SimParams {
    gravity: vec2<f32>,
    dt: f32,
    damping: f32,
    hash_origin: vec2<f32>,
    hash_inv_cell: f32,
    radius: f32,
    hash_dims: vec2<u32>,
    capacity: u32,
    relaxation: f32,
    field_scale: vec4<f32>,
    field_dims: vec2<u32>,
    field_multiplier: f32,
    friction: f32,
    rest_speed: f32,
    rest_time: f32,
    emit_lifetime: f32,
    flags: u32,
    query_radius: u32,
    _pad0: u32,
    _pad1: u32,
    _pad2: u32,
};

struct Body {
    position: vec2<f32>,
    velocity: vec2<f32>,
};

struct SlotMeta {
    elapsed: f32,
    total: f32,
    rest: f32,
    color: u32,
};

struct EmitRecord {
    position: vec2<f32>,
    velocity: vec2<f32>,
    color: u32,
    lifetime: f32,
};

const UNUSED_LIFETIME: f32 = -1.0;
const SOLID_THRESHOLD: f32 = 0.5;

const FLAG_SETTLE: u32 = 1u;
const FLAG_DEPOSIT_ON_EXPIRE: u32 = 2u;
const FLAG_COLLIDE_PARTICLES: u32 = 4u;

// Word indices into the counters buffer.
const DEAD: u32 = 0u;
const ALIVE: u32 = 1u;
const SETTLED: u32 = 2u;

fn is_unused(m: SlotMeta) -> bool {
    return m.total < 0.0;
}

fn is_alive(m: SlotMeta) -> bool {
    return m.elapsed < m.total;
}

fn unused_meta(color: u32) -> SlotMeta {
    return SlotMeta(0.0, UNUSED_LIFETIME, 0.0, color);
}
"#;

/// Terrain uniform shared by the carve and deposit kernels.
pub const TERRAIN_WGSL: &str = r#"
struct TerrainParams {
    size: vec2<u32>,
    explosion_count: u32,
    carve_strength: f32,
    carve_speed: f32,
    record_capacity: u32,
    _pad0: u32,
    _pad1: u32,
};
"#;

const INIT_BODY: &str = r#"
@group(0) @binding(0) var<uniform> params: SimParams;
@group(0) @binding(1) var<storage, read_write> slot_meta: array<SlotMeta>;
@group(0) @binding(2) var<storage, read_write> dead_list: array<u32>;
@group(0) @binding(3) var<storage, read_write> counters: array<atomic<u32>>;

@compute @workgroup_size(128)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let i = gid.x;
    if i >= params.capacity {
        return;
    }
    slot_meta[i] = unused_meta(0u);
    let top = atomicAdd(&counters[DEAD], 1u);
    dead_list[top] = i;
}
"#;

const PREPARE_DISPATCH_BODY: &str = r#"
struct PrepareParams {
    capacity: u32,
    group_size: u32,
    _pad0: u32,
    _pad1: u32,
};

@group(0) @binding(0) var<uniform> prepare: PrepareParams;
@group(0) @binding(1) var<storage, read> args: array<u32>;
@group(0) @binding(2) var<storage, read_write> dispatch_args: array<u32>;

@compute @workgroup_size(1)
fn main() {
    let count = min(args[0], prepare.capacity);
    dispatch_args[0] = (count + prepare.group_size - 1u) / prepare.group_size;
    dispatch_args[1] = 1u;
    dispatch_args[2] = 1u;
}
"#;

const EMIT_BODY: &str = r#"
@group(0) @binding(0) var<uniform> params: SimParams;
@group(0) @binding(1) var<storage, read> uploads: array<EmitRecord>;
@group(0) @binding(2) var<storage, read> upload_args: array<u32>;
@group(0) @binding(3) var<storage, read> dead_args: array<u32>;
@group(0) @binding(4) var<storage, read> dead_list: array<u32>;
@group(0) @binding(5) var<storage, read_write> counters: array<atomic<u32>>;
@group(0) @binding(6) var<storage, read_write> bodies: array<Body>;
@group(0) @binding(7) var<storage, read_write> slot_meta: array<SlotMeta>;

@compute @workgroup_size(128)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let i = gid.x;
    let count = min(upload_args[0], arrayLength(&uploads));
    // Both snapshots were taken before this pass, so every surviving thread
    // pops exactly one slot.
    if i >= count || i >= dead_args[0] {
        return;
    }

    let top = atomicSub(&counters[DEAD], 1u);
    let slot = dead_list[top - 1u];
    let record = uploads[i];
    var lifetime = record.lifetime;
    if lifetime <= 0.0 {
        lifetime = params.emit_lifetime;
    }
    bodies[slot] = Body(record.position, record.velocity);
    slot_meta[slot] = SlotMeta(0.0, lifetime, 0.0, record.color);
}
"#;

const PREDICT_BODY: &str = r#"
@group(0) @binding(0) var<uniform> params: SimParams;
@group(0) @binding(1) var<storage, read> bodies: array<Body>;
@group(0) @binding(2) var<storage, read> slot_meta: array<SlotMeta>;
@group(0) @binding(3) var<storage, read_write> predicted_out: array<vec2<f32>>;

@compute @workgroup_size(128)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let i = gid.x;
    if i >= params.capacity {
        return;
    }
    let b = bodies[i];
    if is_alive(slot_meta[i]) {
        let damp = max(1.0 - params.damping * params.dt, 0.0);
        let v = (b.velocity + params.gravity * params.dt) * damp;
        predicted_out[i] = b.position + v * params.dt;
    } else {
        predicted_out[i] = b.position;
    }
}
"#;

const HASH_COUNT_BODY: &str = r#"
@group(0) @binding(0) var<uniform> params: SimParams;
@group(0) @binding(1) var<storage, read> predicted: array<vec2<f32>>;
@group(0) @binding(2) var<storage, read> slot_meta: array<SlotMeta>;
@group(0) @binding(3) var<storage, read_write> cell_counts: array<atomic<u32>>;

@compute @workgroup_size(128)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let i = gid.x;
    if i >= params.capacity || !is_alive(slot_meta[i]) {
        return;
    }
    let c = cell_coords(predicted[i], params.hash_origin, params.hash_inv_cell, params.hash_dims);
    atomicAdd(&cell_counts[flatten_cell(c, params.hash_dims)], 1u);
}
"#;

const HASH_SCATTER_BODY: &str = r#"
@group(0) @binding(0) var<uniform> params: SimParams;
@group(0) @binding(1) var<storage, read> predicted: array<vec2<f32>>;
@group(0) @binding(2) var<storage, read> slot_meta: array<SlotMeta>;
@group(0) @binding(3) var<storage, read_write> cell_cursor: array<atomic<u32>>;
@group(0) @binding(4) var<storage, read_write> index_map: array<u32>;

@compute @workgroup_size(128)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let i = gid.x;
    if i >= params.capacity || !is_alive(slot_meta[i]) {
        return;
    }
    let c = cell_coords(predicted[i], params.hash_origin, params.hash_inv_cell, params.hash_dims);
    let dst = atomicAdd(&cell_cursor[flatten_cell(c, params.hash_dims)], 1u);
    index_map[dst] = i;
}
"#;

/// Exclusive scan over 256-element blocks.
///
/// `scan_blocks` scans each block in place and writes the block total to
/// `block_sums`; `add_block_offsets` adds the scanned totals back.
pub const SCAN_WGSL: &str = r#"
struct ScanParams {
    count: u32,
    _pad0: u32,
    _pad1: u32,
    _pad2: u32,
};

@group(0) @binding(0) var<uniform> scan: ScanParams;
@group(0) @binding(1) var<storage, read_write> data: array<u32>;
@group(0) @binding(2) var<storage, read_write> block_sums: array<u32>;

var<workgroup> temp: array<u32, 256>;

@compute @workgroup_size(256)
fn scan_blocks(
    @builtin(global_invocation_id) gid: vec3<u32>,
    @builtin(local_invocation_id) lid: vec3<u32>,
    @builtin(workgroup_id) wid: vec3<u32>,
) {
    let i = gid.x;
    let t = lid.x;
    var value = 0u;
    if i < scan.count {
        value = data[i];
    }
    temp[t] = value;
    workgroupBarrier();

    // Hillis-Steele inclusive scan.
    for (var offset = 1u; offset < 256u; offset = offset * 2u) {
        var add = 0u;
        if t >= offset {
            add = temp[t - offset];
        }
        workgroupBarrier();
        temp[t] = temp[t] + add;
        workgroupBarrier();
    }

    if i < scan.count {
        data[i] = temp[t] - value;
    }
    if t == 255u {
        block_sums[wid.x] = temp[t];
    }
}

@compute @workgroup_size(256)
fn add_block_offsets(
    @builtin(global_invocation_id) gid: vec3<u32>,
    @builtin(workgroup_id) wid: vec3<u32>,
) {
    let i = gid.x;
    if i < scan.count {
        data[i] = data[i] + block_sums[wid.x];
    }
}
"#;

const FIELD_SAMPLING: &str = r#"
fn field_texel(c: vec2<i32>) -> f32 {
    let dims = vec2<i32>(params.field_dims);
    let k = clamp(c, vec2<i32>(0, 0), dims - vec2<i32>(1, 1));
    return field[u32(k.y * dims.x + k.x)];
}

fn sample_field(p: vec2<f32>) -> f32 {
    let uv = p * params.field_scale.xy + vec2<f32>(0.5, 0.5);
    let t = uv * vec2<f32>(params.field_dims) - vec2<f32>(0.5, 0.5);
    let base = floor(t);
    let f = t - base;
    let c = vec2<i32>(base);
    let v00 = field_texel(c);
    let v10 = field_texel(c + vec2<i32>(1, 0));
    let v01 = field_texel(c + vec2<i32>(0, 1));
    let v11 = field_texel(c + vec2<i32>(1, 1));
    return mix(mix(v00, v10, f.x), mix(v01, v11, f.x), f.y) * params.field_multiplier;
}

fn field_gradient(p: vec2<f32>) -> vec2<f32> {
    let h = params.field_multiplier;
    let g = vec2<f32>(
        sample_field(p + vec2<f32>(h, 0.0)) - sample_field(p - vec2<f32>(h, 0.0)),
        sample_field(p + vec2<f32>(0.0, h)) - sample_field(p - vec2<f32>(0.0, h)),
    );
    if dot(g, g) < 1e-12 {
        return vec2<f32>(0.0, 1.0);
    }
    return normalize(g);
}
"#;

const SOLVE_BODY: &str = r#"
@group(0) @binding(0) var<uniform> params: SimParams;
@group(0) @binding(1) var<storage, read> predicted_in: array<vec2<f32>>;
@group(0) @binding(2) var<storage, read_write> predicted_out: array<vec2<f32>>;
@group(0) @binding(3) var<storage, read> bodies: array<Body>;
@group(0) @binding(4) var<storage, read> slot_meta: array<SlotMeta>;
@group(0) @binding(5) var<storage, read> cell_counts: array<u32>;
@group(0) @binding(6) var<storage, read> cell_offsets: array<u32>;
@group(0) @binding(7) var<storage, read> index_map: array<u32>;
@group(0) @binding(8) var<storage, read> field: array<f32>;

{field_sampling}

@compute @workgroup_size(128)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let i = gid.x;
    if i >= params.capacity {
        return;
    }
    let p0 = predicted_in[i];
    if !is_alive(slot_meta[i]) {
        predicted_out[i] = p0;
        return;
    }

    let min_sep = params.radius * 2.0;
    var correction = vec2<f32>(0.0, 0.0);
    if (params.flags & FLAG_COLLIDE_PARTICLES) != 0u {
        let center = cell_coords(p0, params.hash_origin, params.hash_inv_cell, params.hash_dims);
        let r = i32(params.query_radius);
        let max_cell = vec2<i32>(params.hash_dims) - vec2<i32>(1, 1);
        for (var dy = -r; dy <= r; dy++) {
            for (var dx = -r; dx <= r; dx++) {
                let c = center + vec2<i32>(dx, dy);
                if c.x < 0 || c.y < 0 || c.x > max_cell.x || c.y > max_cell.y {
                    continue;
                }
                let cell = flatten_cell(c, params.hash_dims);
                let start = cell_offsets[cell];
                let end = start + cell_counts[cell];
                for (var k = start; k < end; k++) {
                    let j = index_map[k];
                    if j == i || !is_alive(slot_meta[j]) {
                        continue;
                    }
                    let d = p0 - predicted_in[j];
                    let dist2 = dot(d, d);
                    if dist2 >= min_sep * min_sep {
                        continue;
                    }
                    let dist = sqrt(dist2);
                    var n = vec2<f32>(1.0, 0.0);
                    if dist > 1e-6 {
                        n = d / dist;
                    } else if i < j {
                        n = vec2<f32>(-1.0, 0.0);
                    }
                    correction += n * (min_sep - dist) * 0.5 * params.relaxation;
                }
            }
        }
    }

    var p = p0 + correction;
    let d = sample_field(p);
    if d < params.radius {
        let n = field_gradient(p);
        p += n * (params.radius - d);
        let moved = p - bodies[i].position;
        let tangential = moved - n * dot(moved, n);
        p -= tangential * params.friction;
    }
    predicted_out[i] = p;
}
"#;

const FINALIZE_BODY: &str = r#"
@group(0) @binding(0) var<uniform> params: SimParams;
@group(0) @binding(1) var<storage, read> predicted: array<vec2<f32>>;
@group(0) @binding(2) var<storage, read> bodies_in: array<Body>;
@group(0) @binding(3) var<storage, read_write> bodies_out: array<Body>;
@group(0) @binding(4) var<storage, read_write> slot_meta: array<SlotMeta>;
@group(0) @binding(5) var<storage, read_write> dead_list: array<u32>;
@group(0) @binding(6) var<storage, read_write> alive_list: array<u32>;
@group(0) @binding(7) var<storage, read_write> settle_list: array<u32>;
@group(0) @binding(8) var<storage, read_write> counters: array<atomic<u32>>;

@compute @workgroup_size(128)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let i = gid.x;
    if i >= params.capacity {
        return;
    }
    let prev = bodies_in[i];
    var m = slot_meta[i];
    if is_unused(m) {
        bodies_out[i] = prev;
        return;
    }

    let p = predicted[i];
    let v = (p - prev.position) / params.dt;
    bodies_out[i] = Body(p, v);
    m.elapsed += params.dt;

    var rests = false;
    if (params.flags & FLAG_SETTLE) != 0u {
        if length(v) < params.rest_speed {
            m.rest += params.dt;
        } else {
            m.rest = 0.0;
        }
        rests = params.rest_time > 0.0 && m.rest >= params.rest_time;
    }

    let expired = !is_alive(m);
    if expired || rests {
        if rests || (expired && (params.flags & FLAG_DEPOSIT_ON_EXPIRE) != 0u) {
            let s = atomicAdd(&counters[SETTLED], 1u);
            settle_list[s] = i;
        }
        slot_meta[i] = unused_meta(m.color);
        let top = atomicAdd(&counters[DEAD], 1u);
        dead_list[top] = i;
    } else {
        slot_meta[i] = m;
        let a = atomicAdd(&counters[ALIVE], 1u);
        alive_list[a] = i;
    }
}
"#;

const CARVE_BODY: &str = r#"
@group(0) @binding(0) var<uniform> terrain: TerrainParams;
@group(0) @binding(1) var<storage, read> explosions: array<vec4<f32>>;
@group(0) @binding(2) var<storage, read_write> occupancy: array<f32>;
@group(0) @binding(3) var<storage, read> colors: array<u32>;
@group(0) @binding(4) var<storage, read_write> records: array<EmitRecord>;
@group(0) @binding(5) var<storage, read_write> record_count: array<atomic<u32>>;

@compute @workgroup_size(8, 8)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    if gid.x >= terrain.size.x || gid.y >= terrain.size.y {
        return;
    }
    let center = vec2<f32>(gid.xy) + vec2<f32>(0.5, 0.5) - vec2<f32>(terrain.size) * 0.5;

    var falloff_sum = 0.0;
    var push = vec2<f32>(0.0, 0.0);
    for (var e = 0u; e < terrain.explosion_count; e++) {
        let blast = explosions[e];
        let d = center - blast.xy;
        let d2 = dot(d, d);
        if d2 < blast.z {
            let falloff = 1.0 - d2 / blast.z;
            falloff_sum += falloff;
            if d2 > 0.0 {
                push += normalize(d) * falloff;
            }
        }
    }
    if falloff_sum <= 0.0 {
        return;
    }

    let cell = gid.y * terrain.size.x + gid.x;
    let before = occupancy[cell];
    let after = max(before - falloff_sum * terrain.carve_strength, 0.0);
    occupancy[cell] = after;

    if before >= SOLID_THRESHOLD && after < SOLID_THRESHOLD {
        let slot = atomicAdd(&record_count[0], 1u);
        if slot < terrain.record_capacity {
            records[slot] = EmitRecord(center, push * terrain.carve_speed, colors[cell], 0.0);
        } else {
            atomicSub(&record_count[0], 1u);
        }
    }
}
"#;

const DEPOSIT_BODY: &str = r#"
@group(0) @binding(0) var<uniform> terrain: TerrainParams;
@group(0) @binding(1) var<storage, read> settle_args: array<u32>;
@group(0) @binding(2) var<storage, read> settle_list: array<u32>;
@group(0) @binding(3) var<storage, read> bodies: array<Body>;
@group(0) @binding(4) var<storage, read> slot_meta: array<SlotMeta>;
@group(0) @binding(5) var<storage, read_write> occupancy: array<f32>;
@group(0) @binding(6) var<storage, read_write> colors: array<u32>;

@compute @workgroup_size(128)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let i = gid.x;
    if i >= min(settle_args[0], arrayLength(&settle_list)) {
        return;
    }
    let slot = settle_list[i];
    let cell_pos = floor(bodies[slot].position + vec2<f32>(terrain.size) * 0.5);
    if cell_pos.x < 0.0 || cell_pos.y < 0.0
        || cell_pos.x >= f32(terrain.size.x) || cell_pos.y >= f32(terrain.size.y) {
        return;
    }
    let cell = u32(cell_pos.y) * terrain.size.x + u32(cell_pos.x);
    occupancy[cell] = 1.0;
    colors[cell] = slot_meta[slot].color;
}
"#;

const RENDER_BODY: &str = r#"
struct View {
    view_proj: mat4x4<f32>,
    particle_size: f32,
    _pad0: f32,
    _pad1: f32,
    _pad2: f32,
};

@group(0) @binding(0) var<uniform> view: View;
@group(0) @binding(1) var<storage, read> alive_list: array<u32>;
@group(0) @binding(2) var<storage, read> bodies: array<Body>;
@group(0) @binding(3) var<storage, read> slot_meta: array<SlotMeta>;

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) color: vec4<f32>,
    @location(1) uv: vec2<f32>,
};

@vertex
fn vs_main(
    @builtin(vertex_index) vertex_index: u32,
    @builtin(instance_index) instance_index: u32,
) -> VertexOutput {
    let corner = vec2<f32>(f32(vertex_index & 1u), f32(vertex_index >> 1u));
    let slot = alive_list[instance_index];
    let world = bodies[slot].position + (corner - vec2<f32>(0.5, 0.5)) * view.particle_size;

    var out: VertexOutput;
    out.clip_position = view.view_proj * vec4<f32>(world, 0.0, 1.0);
    out.color = unpack4x8unorm(slot_meta[slot].color);
    out.uv = corner;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return in.color;
}
"#;

fn particle_kernel(body: &str) -> String {
    format!("{COMMON_WGSL}\n{GRID_WGSL}\n{body}")
}

pub fn init_wgsl() -> String {
    particle_kernel(INIT_BODY)
}

pub fn prepare_dispatch_wgsl() -> String {
    PREPARE_DISPATCH_BODY.to_string()
}

pub fn emit_wgsl() -> String {
    particle_kernel(EMIT_BODY)
}

pub fn predict_wgsl() -> String {
    particle_kernel(PREDICT_BODY)
}

pub fn hash_count_wgsl() -> String {
    particle_kernel(HASH_COUNT_BODY)
}

pub fn hash_scatter_wgsl() -> String {
    particle_kernel(HASH_SCATTER_BODY)
}

pub fn solve_wgsl() -> String {
    particle_kernel(&SOLVE_BODY.replace("{field_sampling}", FIELD_SAMPLING))
}

pub fn finalize_wgsl() -> String {
    particle_kernel(FINALIZE_BODY)
}

pub fn carve_wgsl() -> String {
    format!("{COMMON_WGSL}\n{TERRAIN_WGSL}\n{CARVE_BODY}")
}

pub fn deposit_wgsl() -> String {
    format!("{COMMON_WGSL}\n{TERRAIN_WGSL}\n{DEPOSIT_BODY}")
}

pub fn render_wgsl() -> String {
    format!("{COMMON_WGSL}\n{RENDER_BODY}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FLAG_COLLIDE_PARTICLES, FLAG_DEPOSIT_ON_EXPIRE, FLAG_SETTLE};
    use crate::pool::UNUSED_LIFETIME;
    use crate::terrain::SOLID_THRESHOLD;

    /// Validates WGSL code using naga.
    fn validate_wgsl(code: &str) -> Result<(), String> {
        let module = naga::front::wgsl::parse_str(code)
            .map_err(|e| format!("WGSL parse error: {:?}", e))?;

        let mut validator = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        );
        validator
            .validate(&module)
            .map_err(|e| format!("WGSL validation error: {:?}", e))?;

        Ok(())
    }

    fn assert_valid(name: &str, code: &str) {
        if let Err(e) = validate_wgsl(code) {
            panic!("{} kernel failed validation:\n{}\n\n{}", name, e, code);
        }
    }

    #[test]
    fn test_particle_kernels_validate() {
        assert_valid("init", &init_wgsl());
        assert_valid("emit", &emit_wgsl());
        assert_valid("predict", &predict_wgsl());
        assert_valid("solve", &solve_wgsl());
        assert_valid("finalize", &finalize_wgsl());
    }

    #[test]
    fn test_hash_kernels_validate() {
        assert_valid("hash count", &hash_count_wgsl());
        assert_valid("hash scatter", &hash_scatter_wgsl());
        assert_valid("scan", SCAN_WGSL);
    }

    #[test]
    fn test_terrain_kernels_validate() {
        assert_valid("carve", &carve_wgsl());
        assert_valid("deposit", &deposit_wgsl());
    }

    #[test]
    fn test_support_kernels_validate() {
        assert_valid("prepare dispatch", &prepare_dispatch_wgsl());
        assert_valid("render", &render_wgsl());
    }

    #[test]
    fn test_solve_inlines_field_sampling() {
        let code = solve_wgsl();
        assert!(code.contains("fn sample_field"));
        assert!(!code.contains("{field_sampling}"));
    }

    #[test]
    fn test_constants_match_host() {
        let flags = [
            ("FLAG_SETTLE", FLAG_SETTLE),
            ("FLAG_DEPOSIT_ON_EXPIRE", FLAG_DEPOSIT_ON_EXPIRE),
            ("FLAG_COLLIDE_PARTICLES", FLAG_COLLIDE_PARTICLES),
        ];
        for (name, value) in flags {
            let decl = format!("const {}: u32 = {}u;", name, value);
            assert!(COMMON_WGSL.contains(&decl), "missing `{}`", decl);
        }
        assert!(COMMON_WGSL.contains(&format!("UNUSED_LIFETIME: f32 = {:?};", UNUSED_LIFETIME)));
        assert!(COMMON_WGSL.contains(&format!("SOLID_THRESHOLD: f32 = {:?};", SOLID_THRESHOLD)));
    }
}
