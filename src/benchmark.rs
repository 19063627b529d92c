//! Runs every strategy against its own copy of one base image and times it.
//!
//! A run walks the states
//! `Idle → Staged → BlitDone → PerLevelDone → SubgroupDone → Destaged → Reported`
//! and [`Benchmark::reset`] returns to `Idle` with fresh pyramids. Every phase is submitted on
//! its own and the host blocks until the device is idle before the next one
//! starts, so no two phases overlap.
use crate::backends::all_strategies;
use crate::codec::{encode_png, DecodedImage};
use crate::command::CommandSequence;
use crate::context::{GpuContext, QueueRole};
use crate::core::*;
use crate::pyramid::{GpuPyramid, MipPyramid, PyramidId};
use crate::sync::BarrierBuilder;
use crate::transfer::{DestagingBuffer, MipAtlas, StagingBuffer};
use crate::util::BYTES_PER_PIXEL;
use log::{info, warn};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BenchmarkState {
    Idle,
    Staged,
    BlitDone,
    PerLevelDone,
    SubgroupDone,
    Destaged,
    Reported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BenchmarkEvent {
    Stage,
    /// The next strategy in line finished.
    StrategyDone,
    Destage,
    Report,
    Reset,
}

impl BenchmarkState {
    pub fn next(self, event: BenchmarkEvent) -> Result<Self, Error> {
        use BenchmarkEvent::*;
        use BenchmarkState::*;
        let next = match (self, event) {
            (Idle, Stage) => Staged,
            (Staged, StrategyDone) => BlitDone,
            (BlitDone, StrategyDone) => PerLevelDone,
            (PerLevelDone, StrategyDone) => SubgroupDone,
            (SubgroupDone, Destage) => Destaged,
            (Destaged, Report) => Reported,
            (Reported, Reset) => Idle,
            (from, event) => return Err(Error::InvalidTransition { from, event }),
        };
        Ok(next)
    }
}

/// Device time one strategy took, or why it could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyTiming {
    pub label: &'static str,
    pub elapsed: Result<Duration, Error>,
}

impl fmt::Display for StrategyTiming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.elapsed {
            Ok(elapsed) => write!(f, "{}: {:.3} us", self.label, elapsed.as_secs_f64() * 1e6),
            Err(e) => write!(f, "{}: timestamp unavailable ({})", self.label, e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchmarkReport {
    pub timings: Vec<StrategyTiming>,
    /// Atlas written for every strategy, in the same order as `timings`.
    pub outputs: Vec<PathBuf>,
}

impl fmt::Display for BenchmarkReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for timing in &self.timings {
            writeln!(f, "{}", timing)?;
        }
        Ok(())
    }
}

/// A strategy and the pyramid only it writes to.
pub struct BenchmarkEntry {
    pub strategy: Box<dyn MipmapStrategy>,
    pub pyramid: GpuPyramid,
}

/// Records the commands `strategy` runs on `pyramid`, starting with the
/// transition into its initial layout.
pub fn record_strategy(
    strategy: &dyn MipmapStrategy,
    pyramid: &mut MipPyramid,
) -> Result<CommandSequence, Error> {
    let mut seq = CommandSequence::new();
    if let Some(initial) = strategy.required_initial_layout() {
        let barriers = BarrierBuilder::transition(pyramid, 0..pyramid.levels(), initial);
        seq.barriers(pyramid, barriers)?;
    }
    strategy.record_commands(&mut seq, pyramid)?;
    Ok(seq)
}

/// Runs `count` strategies through `run_one` in order, advancing `state`
/// once per strategy. A timing whose timestamps could not be read is logged
/// and the next strategy still runs. Any other error stops the run.
pub fn run_in_turn<F>(
    state: &mut BenchmarkState,
    count: usize,
    mut run_one: F,
) -> Result<Vec<StrategyTiming>, Error>
where
    F: FnMut(usize) -> Result<StrategyTiming, Error>,
{
    let mut timings = Vec::with_capacity(count);
    for i in 0..count {
        let timing = run_one(i)?;
        if let Err(e) = &timing.elapsed {
            warn!("{}: {}", timing.label, e);
        }
        timings.push(timing);
        *state = state.next(BenchmarkEvent::StrategyDone)?;
    }
    Ok(timings)
}

/// One freshly created and prepared pyramid per strategy.
fn create_entries(ctx: &GpuContext, width: u32, height: u32) -> Result<Vec<BenchmarkEntry>, Error> {
    let mut entries = Vec::new();
    for (i, mut strategy) in all_strategies().into_iter().enumerate() {
        let usage = strategy.required_usage()
            | wgpu::TextureUsages::COPY_DST
            | wgpu::TextureUsages::COPY_SRC;
        let pyramid = ctx.create_pyramid(PyramidId(i), width, height, usage, strategy.name())?;
        strategy.prepare(ctx, &pyramid)?;
        entries.push(BenchmarkEntry { strategy, pyramid });
    }
    Ok(entries)
}

pub struct Benchmark<'a> {
    ctx: &'a GpuContext,
    width: u32,
    height: u32,
    staging: StagingBuffer,
    entries: Vec<BenchmarkEntry>,
    state: BenchmarkState,
}

impl<'a> Benchmark<'a> {
    /// Uploads `image` and creates and prepares one pyramid per strategy.
    pub fn new(ctx: &'a GpuContext, image: &DecodedImage) -> Result<Self, Error> {
        let pixels = image.pixels.as_u8().ok_or_else(|| {
            Error::DecodeFailure(format!(
                "expected 8 bit texels, got {:?}",
                image.pixels.depth()
            ))
        })?;
        let (width, height) = (image.width, image.height);
        let expected = width as usize * height as usize * BYTES_PER_PIXEL;
        if pixels.len() != expected {
            return Err(Error::DecodeFailure(format!(
                "{} bytes do not hold a {}x{} RGBA image",
                pixels.len(),
                width,
                height
            )));
        }

        let entries = create_entries(ctx, width, height)?;
        let staging = StagingBuffer::new(ctx, width, height, pixels);
        info!(
            "benchmarking {}x{} with {} levels",
            width,
            height,
            crate::util::max_mip_levels(width, height)
        );
        Ok(Self {
            ctx,
            width,
            height,
            staging,
            entries,
            state: BenchmarkState::Idle,
        })
    }

    pub fn state(&self) -> BenchmarkState {
        self.state
    }

    pub fn entries(&self) -> &[BenchmarkEntry] {
        &self.entries
    }

    fn advance(&mut self, event: BenchmarkEvent) -> Result<(), Error> {
        self.state = self.state.next(event)?;
        Ok(())
    }

    /// Copies the base image into level 0 of every pyramid.
    pub fn stage(&mut self) -> Result<(), Error> {
        self.advance(BenchmarkEvent::Stage)?;
        let mut seq = CommandSequence::new();
        for entry in self.entries.iter_mut() {
            StagingBuffer::record(&mut seq, entry.pyramid.state_mut())?;
        }
        let pyramids: Vec<&GpuPyramid> = self.entries.iter().map(|e| &e.pyramid).collect();
        let mut encoder = self.ctx.create_encoder("mipmap-bench-stage");
        self.staging.encode(&pyramids, &seq, &mut encoder)?;
        self.ctx.submit_and_wait(QueueRole::Transfer, encoder);
        for entry in self.entries.iter_mut() {
            entry.pyramid.state_mut().join();
        }
        info!("staged {} pyramids", self.entries.len());
        Ok(())
    }

    /// Runs every strategy in turn. A timestamp that cannot be read is
    /// reported in the timing and the next strategy still runs.
    pub fn run_strategies(&mut self) -> Result<Vec<StrategyTiming>, Error> {
        let mut state = self.state;
        let timings = run_in_turn(&mut state, self.entries.len(), |i| self.run_strategy(i));
        self.state = state;
        timings
    }

    fn run_strategy(&mut self, index: usize) -> Result<StrategyTiming, Error> {
        let ctx = self.ctx;
        let entry = &mut self.entries[index];
        let label = entry.strategy.name();
        let seq = record_strategy(entry.strategy.as_ref(), entry.pyramid.state_mut())?;
        info!("{}: {} commands, {} barriers", label, seq.len(), seq.barrier_count());

        let query = ctx.create_timestamp_query();
        let mut encoder = ctx.create_encoder(label);
        query.begin(&mut encoder);
        entry.strategy.encode(ctx, &entry.pyramid, &seq, &mut encoder)?;
        query.end(&mut encoder);
        ctx.submit_and_wait(entry.strategy.queue_role(), encoder);
        entry.pyramid.state_mut().join();

        Ok(StrategyTiming {
            label,
            elapsed: query.read_elapsed(ctx),
        })
    }

    /// Copies every level of every pyramid back and packs each pyramid into
    /// an atlas.
    pub fn destage(&mut self) -> Result<Vec<MipAtlas>, Error> {
        self.advance(BenchmarkEvent::Destage)?;
        let mut encoder = self.ctx.create_encoder("mipmap-bench-destage");
        let mut buffers = Vec::with_capacity(self.entries.len());
        for entry in self.entries.iter_mut() {
            let buffer = DestagingBuffer::new(self.ctx, entry.pyramid.state());
            let mut seq = CommandSequence::new();
            DestagingBuffer::record(&mut seq, entry.pyramid.state_mut())?;
            buffer.encode(&entry.pyramid, &seq, &mut encoder)?;
            buffers.push(buffer);
        }
        self.ctx.submit_and_wait(QueueRole::Transfer, encoder);
        for entry in self.entries.iter_mut() {
            entry.pyramid.state_mut().join();
        }
        buffers
            .iter()
            .map(|buffer| {
                let levels = buffer.read(self.ctx)?;
                Ok(MipAtlas::compose(self.width, self.height, &levels))
            })
            .collect()
    }

    /// Stages, runs every strategy, destages and writes one atlas per
    /// strategy into `output_dir`.
    pub fn run<P: AsRef<Path>>(&mut self, output_dir: P) -> Result<BenchmarkReport, Error> {
        let output_dir = output_dir.as_ref();
        self.stage()?;
        let timings = self.run_strategies()?;
        let atlases = self.destage()?;

        std::fs::create_dir_all(output_dir)
            .map_err(|e| Error::EncodeFailure(format!("{}: {}", output_dir.display(), e)))?;
        let mut outputs = Vec::with_capacity(atlases.len());
        for (entry, atlas) in self.entries.iter().zip(&atlases) {
            let path = output_dir.join(entry.strategy.output_file_name());
            encode_png(
                &path,
                atlas.pixels(),
                atlas.width(),
                atlas.height(),
                atlas.width() as usize * BYTES_PER_PIXEL,
                BYTES_PER_PIXEL as u32,
            )?;
            info!("wrote {}", path.display());
            outputs.push(path);
        }
        self.advance(BenchmarkEvent::Report)?;
        Ok(BenchmarkReport { timings, outputs })
    }

    /// Returns a reported benchmark to `Idle`. Every pyramid is replaced by
    /// a fresh one, so the next run starts from undefined levels. The staged
    /// base image is kept.
    pub fn reset(&mut self) -> Result<(), Error> {
        let next = self.state.next(BenchmarkEvent::Reset)?;
        self.entries = create_entries(self.ctx, self.width, self.height)?;
        self.state = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::DecodedPixels;
    use crate::command::Command;
    use crate::sync::ImageLayout;
    use crate::util::{
        box_downsample_rgba8, channel_means, checkerboard_rgba8, max_mip_levels, mip_extent,
        solid_rgba8,
    };

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn state_machine() {
        use BenchmarkEvent::*;
        use BenchmarkState::*;
        let mut state = Idle;
        for event in [Stage, StrategyDone, StrategyDone, StrategyDone, Destage, Report] {
            state = state.next(event).unwrap();
        }
        assert_eq!(state, Reported);
        assert_eq!(state.next(Reset), Ok(Idle));
    }

    #[test]
    fn illegal_transitions() {
        use BenchmarkEvent::*;
        use BenchmarkState::*;
        assert_eq!(
            Idle.next(StrategyDone),
            Err(Error::InvalidTransition {
                from: Idle,
                event: StrategyDone
            })
        );
        assert!(PerLevelDone.next(Destage).is_err());
        assert!(SubgroupDone.next(StrategyDone).is_err());
        assert!(Destaged.next(Reset).is_err());
        assert!(Staged.next(Stage).is_err());
    }

    #[test]
    fn timing_lines() {
        let ok = StrategyTiming {
            label: "Blit based mipmap generation",
            elapsed: Ok(Duration::from_nanos(12_345)),
        };
        assert_eq!(ok.to_string(), "Blit based mipmap generation: 12.345 us");
        let failed = StrategyTiming {
            label: "x",
            elapsed: Err(Error::TimestampReadFailure("no timestamps were written".into())),
        };
        assert_eq!(
            failed.to_string(),
            "x: timestamp unavailable (Failed to get timestamp query: no timestamps were written)"
        );
        let report = BenchmarkReport {
            timings: vec![ok, failed],
            outputs: vec![],
        };
        assert_eq!(report.to_string().lines().count(), 2);
    }

    #[test]
    fn timer_failure_does_not_stop_the_run() {
        init();
        let labels = ["blit", "per level", "subgroup"];
        let mut state = BenchmarkState::Staged;
        let timings = run_in_turn(&mut state, labels.len(), |i| {
            let elapsed = match i {
                1 => Err(Error::TimestampReadFailure("query was never resolved".into())),
                _ => Ok(Duration::from_micros(10 * (i as u64 + 1))),
            };
            Ok(StrategyTiming {
                label: labels[i],
                elapsed,
            })
        })
        .unwrap();
        assert_eq!(state, BenchmarkState::SubgroupDone);
        assert_eq!(timings.len(), 3);
        assert!(timings[0].elapsed.is_ok());
        assert!(matches!(
            timings[1].elapsed,
            Err(Error::TimestampReadFailure(_))
        ));
        assert!(timings[2].elapsed.is_ok());

        let report = BenchmarkReport {
            timings,
            outputs: vec![],
        };
        assert_eq!(report.clone(), report);
        assert_eq!(
            report.to_string(),
            "blit: 10.000 us\n\
             per level: timestamp unavailable (Failed to get timestamp query: query was never resolved)\n\
             subgroup: 30.000 us\n"
        );
    }

    #[test]
    fn other_failures_stop_the_run() {
        let mut state = BenchmarkState::Staged;
        let mut ran = Vec::new();
        let result = run_in_turn(&mut state, 3, |i| {
            ran.push(i);
            match i {
                1 => Err(Error::NotPrepared("per level")),
                _ => Ok(StrategyTiming {
                    label: "blit",
                    elapsed: Ok(Duration::from_micros(1)),
                }),
            }
        });
        assert_eq!(result, Err(Error::NotPrepared("per level")));
        assert_eq!(ran, vec![0, 1]);
        assert_eq!(state, BenchmarkState::BlitDone);

        let mut state = BenchmarkState::Idle;
        let result = run_in_turn(&mut state, 1, |_| {
            Ok(StrategyTiming {
                label: "blit",
                elapsed: Ok(Duration::from_micros(1)),
            })
        });
        assert!(matches!(result, Err(Error::InvalidTransition { .. })));
    }

    /// The whole run as the host records it, without a device.
    fn plan(width: u32, height: u32) -> Vec<CommandSequence> {
        let strategies = all_strategies();
        let mut pyramids: Vec<_> = (0..strategies.len())
            .map(|i| MipPyramid::new(PyramidId(i), width, height))
            .collect();
        let mut sequences = Vec::new();

        let mut seq = CommandSequence::new();
        for pyramid in pyramids.iter_mut() {
            StagingBuffer::record(&mut seq, pyramid).unwrap();
            pyramid.join();
        }
        sequences.push(seq);

        for (strategy, pyramid) in strategies.iter().zip(pyramids.iter_mut()) {
            sequences.push(record_strategy(strategy.as_ref(), pyramid).unwrap());
            pyramid.join();
        }

        let mut seq = CommandSequence::new();
        for pyramid in pyramids.iter_mut() {
            DestagingBuffer::record(&mut seq, pyramid).unwrap();
        }
        sequences.push(seq);
        sequences
    }

    #[test]
    fn plans_record_cleanly() {
        init();
        for (w, h) in [(256, 256), (100, 37), (1, 64), (4096, 8), (17, 17)] {
            let sequences = plan(w, h);
            assert_eq!(sequences.len(), 5, "{}x{}", w, h);
        }
    }

    #[test]
    fn one_texel_image() {
        init();
        let sequences = plan(1, 1);
        for seq in &sequences[1..4] {
            assert_eq!(
                seq.count(|c| matches!(c, Command::Blit { .. } | Command::Dispatch { .. })),
                0
            );
        }
        assert_eq!(
            sequences[0].count(|c| matches!(c, Command::CopyBufferToImage { .. })),
            3
        );
        assert_eq!(
            sequences[4].count(|c| matches!(c, Command::CopyImageToBuffer { .. })),
            3
        );
    }

    fn gray_image(width: u32, height: u32) -> DecodedImage {
        DecodedImage {
            width,
            height,
            channels: 4,
            pixels: DecodedPixels::U8(solid_rgba8(width, height, [128, 128, 128, 255])),
        }
    }

    /// Texels of `level` cut back out of an atlas.
    fn atlas_level(atlas: &MipAtlas, width: u32, height: u32, level: u32) -> Vec<u8> {
        let (x0, y0) = MipAtlas::level_origin(width, height, level);
        let (w, h) = mip_extent(width, height, level);
        (0..h)
            .flat_map(|y| (0..w).map(move |x| (x, y)))
            .flat_map(|(x, y)| atlas.texel(x0 + x, y0 + y))
            .collect()
    }

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn gray_end_to_end() {
        init();
        let ctx = GpuContext::new().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let mut benchmark = Benchmark::new(&ctx, &gray_image(256, 256)).unwrap();
        let report = benchmark.run(dir.path()).unwrap();
        assert_eq!(benchmark.state(), BenchmarkState::Reported);
        assert_eq!(report.timings.len(), 3);
        assert_eq!(report.outputs.len(), 3);
        for path in &report.outputs {
            let atlas = crate::codec::decode_file(path, crate::codec::PixelDepth::U8).unwrap();
            assert_eq!((atlas.width, atlas.height), (384, 256));
            let pixels = atlas.pixels.as_u8().unwrap();
            assert_eq!(pixels.len(), 384 * 256 * 4);
            for level in 0..9 {
                let (x0, y0) = MipAtlas::level_origin(256, 256, level);
                let (w, h) = mip_extent(256, 256, level);
                for y in y0..y0 + h {
                    for x in x0..x0 + w {
                        let i = (y as usize * 384 + x as usize) * 4;
                        assert_eq!(
                            &pixels[i..i + 4],
                            &[128, 128, 128, 255],
                            "{:?} level {}",
                            path,
                            level
                        );
                    }
                }
            }
        }
        benchmark.reset().unwrap();
        assert_eq!(benchmark.state(), BenchmarkState::Idle);
        assert_eq!(benchmark.entries().len(), 3);
        for entry in benchmark.entries() {
            let state = entry.pyramid.state();
            for level in 0..state.levels() {
                assert_eq!(state.level_state(level).layout, ImageLayout::Undefined);
            }
        }
        let again = benchmark.run(dir.path()).unwrap();
        assert_eq!(again.outputs, report.outputs);
        assert_eq!(benchmark.state(), BenchmarkState::Reported);
    }

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn strategies_agree_on_checkerboard() {
        init();
        let (width, height) = (64, 64);
        let base = checkerboard_rgba8(width, height, 4);
        let image = DecodedImage {
            width,
            height,
            channels: 4,
            pixels: DecodedPixels::U8(base.clone()),
        };
        let ctx = GpuContext::new().unwrap();
        let mut benchmark = Benchmark::new(&ctx, &image).unwrap();
        benchmark.stage().unwrap();
        let timings = benchmark.run_strategies().unwrap();
        assert_eq!(timings.len(), 3);
        let atlases = benchmark.destage().unwrap();
        assert_eq!(benchmark.state(), BenchmarkState::Destaged);

        let mut expected = base;
        for level in 0..max_mip_levels(width, height) {
            if level > 0 {
                let (w, h) = mip_extent(width, height, level - 1);
                expected = box_downsample_rgba8(&expected, w, h);
            }
            for atlas in &atlases {
                let actual = atlas_level(atlas, width, height, level);
                assert_eq!(actual.len(), expected.len());
                for (a, e) in actual.iter().zip(&expected) {
                    assert!((*a as i32 - *e as i32).abs() <= 2, "level {}: {} vs {}", level, a, e);
                }
                let means = channel_means(&actual);
                let reference = channel_means(&expected);
                for (m, r) in means.iter().zip(&reference) {
                    assert!((m - r).abs() <= 2.0, "level {}", level);
                }
            }
        }
    }

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn compute_strategies_handle_odd_extents() {
        init();
        let ctx = GpuContext::new().unwrap();
        for (width, height) in [(100, 37), (300, 17)] {
            let base = checkerboard_rgba8(width, height, 3);
            let image = DecodedImage {
                width,
                height,
                channels: 4,
                pixels: DecodedPixels::U8(base.clone()),
            };
            let mut benchmark = Benchmark::new(&ctx, &image).unwrap();
            benchmark.stage().unwrap();
            benchmark.run_strategies().unwrap();
            let atlases = benchmark.destage().unwrap();
            let names: Vec<_> = benchmark.entries().iter().map(|e| e.strategy.name()).collect();

            let mut expected = base;
            for level in 0..max_mip_levels(width, height) {
                if level > 0 {
                    let (w, h) = mip_extent(width, height, level - 1);
                    expected = box_downsample_rgba8(&expected, w, h);
                }
                // bilinear blits of odd levels are not a 2x2 box
                for (name, atlas) in names.iter().zip(&atlases).skip(1) {
                    let actual = atlas_level(atlas, width, height, level);
                    assert_eq!(actual.len(), expected.len());
                    for (i, (a, e)) in actual.iter().zip(&expected).enumerate() {
                        assert!(
                            (*a as i32 - *e as i32).abs() <= 2,
                            "{} {}x{} level {} byte {}: {} vs {}",
                            name,
                            width,
                            height,
                            level,
                            i,
                            a,
                            e
                        );
                    }
                }
            }
        }
    }

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn one_texel_end_to_end() {
        init();
        let ctx = GpuContext::new().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let mut benchmark = Benchmark::new(&ctx, &gray_image(1, 1)).unwrap();
        let report = benchmark.run(dir.path()).unwrap();
        for path in &report.outputs {
            let atlas = crate::codec::decode_file(path, crate::codec::PixelDepth::U8).unwrap();
            assert_eq!((atlas.width, atlas.height), (1, 1));
            assert_eq!(atlas.pixels.as_u8(), Some(&[128, 128, 128, 255][..]));
        }
    }

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn rejects_wide_texels() {
        init();
        let ctx = GpuContext::new().unwrap();
        let image = DecodedImage {
            width: 1,
            height: 1,
            channels: 4,
            pixels: DecodedPixels::U16(vec![0; 4]),
        };
        assert!(matches!(
            Benchmark::new(&ctx, &image),
            Err(Error::DecodeFailure(_))
        ));
    }

    #[test]
    fn strategies_agree_on_level_count() {
        let sequences = plan(256, 256);
        let written = |seq: &CommandSequence| {
            let mut levels: Vec<u32> = seq
                .commands()
                .iter()
                .flat_map(|c| match c {
                    Command::Blit { dst_level, .. } => *dst_level..*dst_level + 1,
                    Command::Dispatch { dst_levels, .. } => dst_levels.clone(),
                    _ => 0..0,
                })
                .collect();
            levels.sort_unstable();
            levels
        };
        for seq in &sequences[1..4] {
            assert_eq!(written(seq), (1..9).collect::<Vec<_>>());
        }
    }
}
