/*!
Benchmark three ways of generating mipmaps on the GPU with [wgpu](https://github.com/gfx-rs/wgpu).

- [`BlitStrategy`] rescales one level at a time with the fixed-function
  sampler, with layout transitions between every level.
- [`PerLevelComputeStrategy`] runs one compute dispatch per level, separated
  by memory barriers.
- [`SubgroupComputeStrategy`] reduces up to five levels per dispatch with
  subgroup shuffles and only synchronizes between dispatches.

Every strategy records a [`CommandSequence`] first. Recording checks each
command against the barriers recorded before it, so a strategy that forgets
a barrier fails on the host instead of racing on the device.

## Usage

```no_run
use mipmap_bench::*;
fn example() -> Result<(), Error> {
    // pick a device that supports timestamps, push constants and subgroups
    let ctx = GpuContext::new()?;
    let image = decode_file("cat.png", PixelDepth::U8)?;
    let mut benchmark = Benchmark::new(&ctx, &image)?;
    // writes blit.png, compute_per_level_barriers.png and compute_subgroup.png
    let report = benchmark.run("out")?;
    print!("{}", report);
    Ok(())
}
```
*/
mod backends;
mod benchmark;
mod codec;
mod command;
mod context;
mod core;
mod pyramid;
mod sync;
mod transfer;

#[doc(hidden)]
pub mod util;

#[doc(inline)]
pub use crate::backends::*;
#[doc(inline)]
pub use crate::benchmark::*;
#[doc(inline)]
pub use crate::codec::*;
#[doc(inline)]
pub use crate::command::*;
#[doc(inline)]
pub use crate::context::*;
#[doc(inline)]
pub use crate::core::*;
#[doc(inline)]
pub use crate::pyramid::*;
#[doc(inline)]
pub use crate::sync::*;
#[doc(inline)]
pub use crate::transfer::*;
