//! Device selection, queue roles and the resources every strategy shares.
use crate::core::Error;
use crate::pyramid::{max_mip_levels, GpuPyramid, PyramidId};
use bitflags::bitflags;
use log::{debug, info};
use std::time::Duration;

/// Physical device type, ordered from most to least preferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    DiscreteGpu,
    IntegratedGpu,
    VirtualGpu,
    Other,
    Cpu,
}

impl DeviceKind {
    fn weight(self) -> u32 {
        match self {
            DeviceKind::DiscreteGpu => 4,
            DeviceKind::IntegratedGpu => 3,
            DeviceKind::VirtualGpu => 2,
            DeviceKind::Other => 1,
            DeviceKind::Cpu => 0,
        }
    }
}

impl From<wgpu::DeviceType> for DeviceKind {
    fn from(device_type: wgpu::DeviceType) -> Self {
        match device_type {
            wgpu::DeviceType::DiscreteGpu => DeviceKind::DiscreteGpu,
            wgpu::DeviceType::IntegratedGpu => DeviceKind::IntegratedGpu,
            wgpu::DeviceType::VirtualGpu => DeviceKind::VirtualGpu,
            wgpu::DeviceType::Cpu => DeviceKind::Cpu,
            wgpu::DeviceType::Other => DeviceKind::Other,
        }
    }
}

/// Everything device selection needs to know about one adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCapabilities {
    pub name: String,
    pub kind: DeviceKind,
    /// Timestamps can be written between passes on compute and graphics work.
    pub timestamps: bool,
    /// Subgroup operations, shuffles included, in compute shaders.
    pub subgroups: bool,
    pub min_subgroup_size: u32,
    pub max_subgroup_size: u32,
    pub push_constants: bool,
    pub max_push_constant_size: u32,
    pub max_texture_dimension_2d: u32,
}

/// Smallest subgroup that still holds one 2×2 reduction plus its neighbour.
pub const MIN_SUBGROUP_SIZE: u32 = 8;

/// Push constant bytes used by the largest kernel parameter block.
pub const REQUIRED_PUSH_CONSTANT_SIZE: u32 = 8;

impl DeviceCapabilities {
    pub fn required_features() -> wgpu::Features {
        wgpu::Features::TIMESTAMP_QUERY
            | wgpu::Features::TIMESTAMP_QUERY_INSIDE_ENCODERS
            | wgpu::Features::SUBGROUP
            | wgpu::Features::PUSH_CONSTANTS
    }

    pub fn from_adapter(adapter: &wgpu::Adapter) -> Self {
        let info = adapter.get_info();
        let features = adapter.features();
        let limits = adapter.limits();
        Self {
            name: info.name,
            kind: info.device_type.into(),
            timestamps: features.contains(
                wgpu::Features::TIMESTAMP_QUERY | wgpu::Features::TIMESTAMP_QUERY_INSIDE_ENCODERS,
            ),
            subgroups: features.contains(wgpu::Features::SUBGROUP),
            min_subgroup_size: limits.min_subgroup_size,
            max_subgroup_size: limits.max_subgroup_size,
            push_constants: features.contains(wgpu::Features::PUSH_CONSTANTS),
            max_push_constant_size: limits.max_push_constant_size,
            max_texture_dimension_2d: limits.max_texture_dimension_2d,
        }
    }

    /// Whether the device can run all three strategies with timing.
    pub fn is_eligible(&self) -> bool {
        self.timestamps
            && self.subgroups
            && self.min_subgroup_size >= MIN_SUBGROUP_SIZE
            && self.push_constants
            && self.max_push_constant_size >= REQUIRED_PUSH_CONSTANT_SIZE
    }
}

/// Scores a device. Zero excludes it, otherwise higher is better: the
/// device kind decides and the maximum texture size breaks ties.
pub fn score(caps: &DeviceCapabilities) -> u32 {
    if !caps.is_eligible() {
        return 0;
    }
    (caps.kind.weight() << 16) | caps.max_texture_dimension_2d.min(0xffff) | 1
}

/// Index of the best scoring device. The first one wins ties.
pub fn select_device(candidates: &[DeviceCapabilities]) -> Result<usize, Error> {
    candidates
        .iter()
        .enumerate()
        .map(|(index, caps)| (index, score(caps)))
        .filter(|&(_, score)| score > 0)
        .fold(None, |best: Option<(usize, u32)>, (index, score)| match best {
            Some((_, best_score)) if best_score >= score => best,
            _ => Some((index, score)),
        })
        .map(|(index, _)| index)
        .ok_or(Error::DeviceUnsupported)
}

bitflags! {
    /// What the queues of a family can do.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct QueueCapabilities: u32 {
        const GRAPHICS = 1 << 0;
        const COMPUTE = 1 << 1;
        const TRANSFER = 1 << 2;
        const SPARSE_BINDING = 1 << 3;
    }
}

/// Kind of work submitted to a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueRole {
    Compute,
    Graphics,
    Transfer,
}

impl QueueRole {
    pub const ALL: [QueueRole; 3] = [QueueRole::Compute, QueueRole::Graphics, QueueRole::Transfer];

    pub fn capability(self) -> QueueCapabilities {
        match self {
            QueueRole::Compute => QueueCapabilities::COMPUTE,
            QueueRole::Graphics => QueueCapabilities::GRAPHICS,
            QueueRole::Transfer => QueueCapabilities::TRANSFER,
        }
    }
}

const ROLE_CAPABILITIES: QueueCapabilities = QueueCapabilities::GRAPHICS
    .union(QueueCapabilities::COMPUTE)
    .union(QueueCapabilities::TRANSFER);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamily {
    pub index: u32,
    pub capabilities: QueueCapabilities,
}

impl QueueFamily {
    /// The single family wgpu exposes: one queue that does everything.
    pub fn universal() -> Self {
        Self {
            index: 0,
            capabilities: QueueCapabilities::GRAPHICS
                | QueueCapabilities::COMPUTE
                | QueueCapabilities::TRANSFER,
        }
    }

    /// Graphics and compute queues can always transfer, even when the
    /// family does not advertise it.
    pub fn offers(&self, role: QueueRole) -> bool {
        match role {
            QueueRole::Transfer => self.capabilities.intersects(
                QueueCapabilities::TRANSFER
                    | QueueCapabilities::GRAPHICS
                    | QueueCapabilities::COMPUTE,
            ),
            role => self.capabilities.contains(role.capability()),
        }
    }

    /// Sort key for `role`, lower is more specialized. Only role capabilities
    /// count, and transfer work prefers families without graphics or compute.
    fn specialization(&self, role: QueueRole) -> (bool, u32, u32) {
        let roles = self.capabilities & ROLE_CAPABILITIES;
        let shared = role == QueueRole::Transfer
            && roles.intersects(QueueCapabilities::GRAPHICS | QueueCapabilities::COMPUTE);
        (shared, roles.bits().count_ones(), self.index)
    }
}

/// Family index serving each role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueRoles {
    pub compute: u32,
    pub graphics: u32,
    pub transfer: u32,
}

impl QueueRoles {
    pub fn family(&self, role: QueueRole) -> u32 {
        match role {
            QueueRole::Compute => self.compute,
            QueueRole::Graphics => self.graphics,
            QueueRole::Transfer => self.transfer,
        }
    }
}

/// Assigns every role the most specialized family offering it, lowest index
/// first on ties.
pub fn assign_queue_roles(families: &[QueueFamily]) -> Result<QueueRoles, Error> {
    let pick = |role: QueueRole| {
        families
            .iter()
            .filter(|family| family.offers(role))
            .min_by_key(|family| family.specialization(role))
            .map(|family| family.index)
            .ok_or(Error::QueueFamilyMissing(role))
    };
    Ok(QueueRoles {
        compute: pick(QueueRole::Compute)?,
        graphics: pick(QueueRole::Graphics)?,
        transfer: pick(QueueRole::Transfer)?,
    })
}

/// The opened device and everything shared by the benchmark phases.
pub struct GpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    capabilities: DeviceCapabilities,
    roles: QueueRoles,
    timestamp_period: f32,
    // dropped after the device and queue
    _instance: wgpu::Instance,
}

impl GpuContext {
    /// Picks the best eligible adapter and opens it with the features the
    /// benchmark needs.
    pub fn new() -> Result<Self, Error> {
        futures::executor::block_on(Self::new_async())
    }

    pub async fn new_async() -> Result<Self, Error> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let mut adapters = instance.enumerate_adapters(wgpu::Backends::all());
        let candidates: Vec<DeviceCapabilities> =
            adapters.iter().map(DeviceCapabilities::from_adapter).collect();
        for caps in &candidates {
            info!("adapter {} ({:?}) scores {}", caps.name, caps.kind, score(caps));
        }
        let selected = select_device(&candidates)?;
        let adapter = adapters.swap_remove(selected);
        let capabilities = candidates[selected].clone();
        info!("selected {}", capabilities.name);

        let roles = assign_queue_roles(&[QueueFamily::universal()])?;
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("mipmap-bench"),
                    required_features: DeviceCapabilities::required_features(),
                    required_limits: adapter.limits(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await
            .map_err(|e| Error::RequestDevice(e.to_string()))?;
        let timestamp_period = queue.get_timestamp_period();
        debug!("timestamp period {} ns", timestamp_period);
        Ok(Self {
            device,
            queue,
            capabilities,
            roles,
            timestamp_period,
            _instance: instance,
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    pub fn roles(&self) -> &QueueRoles {
        &self.roles
    }

    /// Queue serving `role`. wgpu has a single queue, so every role shares it.
    pub fn queue(&self, role: QueueRole) -> &wgpu::Queue {
        debug!("{:?} work goes to family {}", role, self.roles.family(role));
        &self.queue
    }

    /// Nanoseconds per timestamp tick.
    pub fn timestamp_period(&self) -> f32 {
        self.timestamp_period
    }

    /// Creates an RGBA8 pyramid with the full mip chain.
    pub fn create_pyramid(
        &self,
        id: PyramidId,
        width: u32,
        height: u32,
        usage: wgpu::TextureUsages,
        label: &str,
    ) -> Result<GpuPyramid, Error> {
        let max = self.capabilities.max_texture_dimension_2d;
        if width == 0 || height == 0 || width > max || height > max {
            return Err(Error::UnsupportedExtent { width, height, max });
        }
        debug!(
            "creating {} ({}x{}, {} levels)",
            label,
            width,
            height,
            max_mip_levels(width, height)
        );
        Ok(GpuPyramid::new(
            &self.device,
            id,
            width,
            height,
            usage,
            label,
        ))
    }

    pub fn create_buffer(&self, label: &str, size: u64, usage: wgpu::BufferUsages) -> wgpu::Buffer {
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage,
            mapped_at_creation: false,
        })
    }

    pub fn create_buffer_init(
        &self,
        label: &str,
        contents: &[u8],
        usage: wgpu::BufferUsages,
    ) -> wgpu::Buffer {
        use wgpu::util::DeviceExt;
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage,
            })
    }

    pub fn create_encoder(&self, label: &str) -> wgpu::CommandEncoder {
        self.device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })
    }

    /// Submits `encoder` to the queue serving `role` and blocks until the
    /// device is idle. There is no timeout.
    pub fn submit_and_wait(&self, role: QueueRole, encoder: wgpu::CommandEncoder) {
        self.queue(role).submit(std::iter::once(encoder.finish()));
        let _ = self.device.poll(wgpu::Maintain::Wait);
    }

    /// Maps `buffer` for reading and copies its contents out.
    pub fn read_buffer(&self, buffer: &wgpu::Buffer) -> Result<Vec<u8>, String> {
        let slice = buffer.slice(..);
        let (sender, receiver) = futures::channel::oneshot::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);
        futures::executor::block_on(receiver)
            .map_err(|_| "map callback was dropped".to_string())?
            .map_err(|e| e.to_string())?;
        let data = slice.get_mapped_range().to_vec();
        buffer.unmap();
        Ok(data)
    }

    pub fn create_timestamp_query(&self) -> TimestampQuery {
        TimestampQuery::new(self)
    }
}

/// A pair of timestamps bracketing a command sequence.
#[derive(Debug)]
pub struct TimestampQuery {
    query_set: wgpu::QuerySet,
    resolve: wgpu::Buffer,
    readback: wgpu::Buffer,
    period_ns: f32,
}

const TIMESTAMP_BYTES: u64 = 2 * wgpu::QUERY_SIZE as u64;

impl TimestampQuery {
    fn new(ctx: &GpuContext) -> Self {
        let query_set = ctx.device.create_query_set(&wgpu::QuerySetDescriptor {
            label: Some("mipmap-bench-timestamps"),
            ty: wgpu::QueryType::Timestamp,
            count: 2,
        });
        let resolve = ctx.create_buffer(
            "mipmap-bench-timestamp-resolve",
            TIMESTAMP_BYTES,
            wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC,
        );
        let readback = ctx.create_buffer(
            "mipmap-bench-timestamp-readback",
            TIMESTAMP_BYTES,
            wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        );
        Self {
            query_set,
            resolve,
            readback,
            period_ns: ctx.timestamp_period(),
        }
    }

    pub fn begin(&self, encoder: &mut wgpu::CommandEncoder) {
        encoder.write_timestamp(&self.query_set, 0);
    }

    /// Writes the closing timestamp and queues the copy to the readback buffer.
    pub fn end(&self, encoder: &mut wgpu::CommandEncoder) {
        encoder.write_timestamp(&self.query_set, 1);
        encoder.resolve_query_set(&self.query_set, 0..2, &self.resolve, 0);
        encoder.copy_buffer_to_buffer(&self.resolve, 0, &self.readback, 0, TIMESTAMP_BYTES);
    }

    /// Device time between the two timestamps. Call after the encoder that
    /// wrote them has completed.
    pub fn read_elapsed(&self, ctx: &GpuContext) -> Result<Duration, Error> {
        let data = ctx
            .read_buffer(&self.readback)
            .map_err(Error::TimestampReadFailure)?;
        let [start, end]: [u64; 2] = bytemuck::pod_read_unaligned(&data[..TIMESTAMP_BYTES as usize]);
        elapsed(start, end, self.period_ns)
    }
}

/// Converts a pair of raw timestamps into wall-clock time.
pub fn elapsed(start: u64, end: u64, period_ns: f32) -> Result<Duration, Error> {
    if !(period_ns > 0.0) {
        return Err(Error::TimestampReadFailure(format!(
            "timestamp period is {}",
            period_ns
        )));
    }
    if start == 0 && end == 0 {
        return Err(Error::TimestampReadFailure(
            "no timestamps were written".to_string(),
        ));
    }
    if end < start {
        return Err(Error::TimestampReadFailure(format!(
            "end tick {} precedes start tick {}",
            end, start
        )));
    }
    let nanos = (end - start) as f64 * period_ns as f64;
    Ok(Duration::from_nanos(nanos.round() as u64))
}
