mod threads;

pub use threads::{run_spmd, ThreadGroup};

/// Group of processes that share the atoms of one calculation. All ranks
/// of a group have to call the collective operations in the same order.
pub trait ProcessGroup: Sync {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    /// Element-wise sum of `data` over all ranks. On return every rank holds the total.
    fn sum(&self, data: &mut [f64]);

    fn sum_scalar(&self, value: f64) -> f64 {
        let mut buffer: [f64; 1] = [value];
        self.sum(&mut buffer);
        buffer[0]
    }
}

/// Group that consists of the calling process only.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialGroup;

impl ProcessGroup for SerialGroup {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn sum(&self, _data: &mut [f64]) {}
}

/// Round-robin distribution of the atoms: the indices of the atoms that are owned by this rank.
pub fn atom_partition<G: ProcessGroup + ?Sized>(n_atoms: usize, group: &G) -> Vec<usize> {
    (group.rank()..n_atoms).step_by(group.size()).collect()
}
