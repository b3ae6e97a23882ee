use crate::constants::BOHR_TO_ANGS;
use anyhow::{Context, Result};
use chemfiles::{CellShape, Frame, Trajectory};
use ndarray::Array2;

/// Geometry of the polarizable system. All lengths are in bohr.
#[derive(Debug, Clone)]
pub struct Geometry {
    pub elements: Vec<String>,
    pub atomic_numbers: Vec<u8>,
    pub positions: Array2<f64>,
    /// Lengths of the periodic cell, `None` for a non-periodic geometry.
    pub cell: Option<[f64; 3]>,
}

/// Extract the element names, atomic numbers, positions and cell lengths (in bohr)
/// from a [Frame](chemfiles::Frame)
pub fn frame_to_geometry(frame: &Frame) -> Result<Geometry> {
    let mut positions: Array2<f64> = Array2::from_shape_vec(
        (frame.size(), 3),
        frame
            .positions()
            .iter()
            .flat_map(|array| array.iter())
            .cloned()
            .collect(),
    )
    .context("The positions of the frame do not have three components")?;
    // transform the coordinates from angstrom to bohr
    positions /= BOHR_TO_ANGS;

    let elements: Vec<String> = (0..frame.size()).map(|i| frame.atom(i).name()).collect();
    let atomic_numbers: Vec<u8> = (0..frame.size())
        .map(|i| frame.atom(i).atomic_number() as u8)
        .collect();

    let cell = frame.cell();
    let cell: Option<[f64; 3]> = match cell.shape() {
        CellShape::Infinite => None,
        _ => {
            let lengths: [f64; 3] = cell.lengths();
            Some([
                lengths[0] / BOHR_TO_ANGS,
                lengths[1] / BOHR_TO_ANGS,
                lengths[2] / BOHR_TO_ANGS,
            ])
        }
    };

    Ok(Geometry {
        elements,
        atomic_numbers,
        positions,
        cell,
    })
}

/// Read a xyz-geometry file like .xyz or .pdb and returns a [Frame](chemfiles::Frame)
pub fn read_file_to_frame(filename: &str) -> Result<Frame> {
    // read the geometry file
    let mut trajectory = Trajectory::open(filename, 'r')
        .with_context(|| format!("Unable to open the geometry file {}", filename))?;
    let mut frame = Frame::new();
    // if multiple geometries are contained in the file, we will only use the first one
    trajectory
        .read(&mut frame)
        .with_context(|| format!("Unable to read a geometry from {}", filename))?;
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_are_converted_to_bohr() {
        let mut frame = Frame::new();
        frame.add_atom(&chemfiles::Atom::new("O"), [0.0, 0.0, 0.0], None);
        frame.add_atom(&chemfiles::Atom::new("H"), [0.0, 0.0, 1.0], None);
        let geometry: Geometry = frame_to_geometry(&frame).unwrap();
        assert_eq!(geometry.elements, vec!["O".to_string(), "H".to_string()]);
        assert_eq!(geometry.atomic_numbers, vec![8, 1]);
        assert!((geometry.positions[[1, 2]] - 1.0 / BOHR_TO_ANGS).abs() < 1e-12);
        assert!(geometry.cell.is_none());
    }
}
