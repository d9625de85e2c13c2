//! The fixed order of passes within one frame and the textures each touches.
//!
//! Pass ordering errors do not raise anything at runtime; they just produce a
//! wrong picture. Writing the schedule down as data lets the orchestrator walk
//! it and lets tests check the dependencies without a GPU.

use crate::targets::TextureSlot;

/// One logical pass of the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pass {
    /// Splat particles into the depth texture, nearest surface wins.
    ParticleDepth,
    /// Two-pass blur of depth through the scratch texture.
    DepthSmoothing,
    /// Additively splat particle thickness.
    Thickness,
    /// Two-pass blur of thickness through the thickness-blur texture.
    ThicknessSmoothing,
    /// Shade the destination from smoothed depth and thickness.
    Composite,
}

/// A pass and its texture dependencies.
#[derive(Clone, Copy, Debug)]
pub struct PassStep {
    pub pass: Pass,
    /// Textures sampled by the pass.
    pub reads: &'static [TextureSlot],
    /// Textures rendered to by the pass, in order.
    pub writes: &'static [TextureSlot],
}

/// Passes in execution order.
///
/// The depth chain (`ParticleDepth`, `DepthSmoothing`) and the thickness chain
/// (`Thickness`, `ThicknessSmoothing`) touch disjoint textures, so their
/// relative order is free; only `Composite` joins them.
pub const FRAME_SCHEDULE: [PassStep; 5] = [
    PassStep {
        pass: Pass::ParticleDepth,
        reads: &[],
        writes: &[TextureSlot::Depth],
    },
    PassStep {
        pass: Pass::DepthSmoothing,
        reads: &[TextureSlot::Depth],
        writes: &[TextureSlot::BlurScratch, TextureSlot::Depth],
    },
    PassStep {
        pass: Pass::Thickness,
        reads: &[],
        writes: &[TextureSlot::Thickness],
    },
    PassStep {
        pass: Pass::ThicknessSmoothing,
        reads: &[TextureSlot::Thickness],
        writes: &[TextureSlot::ThicknessBlur, TextureSlot::Thickness],
    },
    PassStep {
        pass: Pass::Composite,
        reads: &[TextureSlot::Depth, TextureSlot::Thickness],
        writes: &[],
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    fn position(pass: Pass) -> usize {
        FRAME_SCHEDULE
            .iter()
            .position(|s| s.pass == pass)
            .unwrap()
    }

    #[test]
    fn reads_follow_writes_in_the_same_frame() {
        let mut written: Vec<TextureSlot> = Vec::new();
        for step in FRAME_SCHEDULE {
            for read in step.reads {
                assert!(
                    written.contains(read),
                    "{:?} reads {:?} before any pass of this frame wrote it",
                    step.pass,
                    read
                );
            }
            written.extend_from_slice(step.writes);
        }
    }

    #[test]
    fn every_texture_is_written_each_frame() {
        for slot in TextureSlot::ALL {
            assert!(
                FRAME_SCHEDULE.iter().any(|s| s.writes.contains(&slot)),
                "{slot:?} is never written"
            );
        }
    }

    #[test]
    fn composite_runs_last() {
        assert_eq!(position(Pass::Composite), FRAME_SCHEDULE.len() - 1);
    }

    #[test]
    fn smoothing_follows_its_splat() {
        assert!(position(Pass::ParticleDepth) < position(Pass::DepthSmoothing));
        assert!(position(Pass::Thickness) < position(Pass::ThicknessSmoothing));
    }

    #[test]
    fn depth_and_thickness_chains_are_independent() {
        let depth_chain = [Pass::ParticleDepth, Pass::DepthSmoothing];
        let thickness_chain = [Pass::Thickness, Pass::ThicknessSmoothing];

        let touched = |chain: &[Pass]| -> Vec<TextureSlot> {
            FRAME_SCHEDULE
                .iter()
                .filter(|s| chain.contains(&s.pass))
                .flat_map(|s| s.reads.iter().chain(s.writes.iter()).copied())
                .collect()
        };

        let depth = touched(&depth_chain);
        for slot in touched(&thickness_chain) {
            assert!(!depth.contains(&slot), "{slot:?} shared between chains");
        }
    }

    #[test]
    fn composite_reads_the_smoothed_outputs() {
        let composite = FRAME_SCHEDULE[position(Pass::Composite)];
        let depth_smoothing = FRAME_SCHEDULE[position(Pass::DepthSmoothing)];
        let thickness_smoothing = FRAME_SCHEDULE[position(Pass::ThicknessSmoothing)];

        assert_eq!(depth_smoothing.writes.last(), Some(&TextureSlot::Depth));
        assert_eq!(thickness_smoothing.writes.last(), Some(&TextureSlot::Thickness));
        assert_eq!(composite.reads, &[TextureSlot::Depth, TextureSlot::Thickness]);
    }
}
