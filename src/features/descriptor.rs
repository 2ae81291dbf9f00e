use serde::{Deserialize, Serialize};

/// Feature descriptor: binary strings compare by Hamming distance, float
/// vectors by Euclidean distance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Descriptor {
    Binary(Vec<u8>),
    Float(Vec<f32>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
    Binary,
    Float,
}

impl Descriptor {
    pub fn kind(&self) -> DescriptorKind {
        match self {
            Descriptor::Binary(_) => DescriptorKind::Binary,
            Descriptor::Float(_) => DescriptorKind::Float,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Descriptor::Binary(b) => b.len(),
            Descriptor::Float(f) => f.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Distance to another descriptor, `None` if the two are not comparable.
    pub fn distance(&self, other: &Descriptor) -> Option<f32> {
        match (self, other) {
            (Descriptor::Binary(a), Descriptor::Binary(b)) if a.len() == b.len() => Some(
                a.iter()
                    .zip(b.iter())
                    .map(|(x, y)| (x ^ y).count_ones())
                    .sum::<u32>() as f32,
            ),
            (Descriptor::Float(a), Descriptor::Float(b)) if a.len() == b.len() => Some(
                a.iter()
                    .zip(b.iter())
                    .map(|(x, y)| (x - y) * (x - y))
                    .sum::<f32>()
                    .sqrt(),
            ),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hamming_distance() {
        let a = Descriptor::Binary(vec![0b1010_1010, 0xff]);
        let b = Descriptor::Binary(vec![0b0101_0101, 0xff]);

        assert_eq!(a.distance(&b), Some(8.0));
        assert_eq!(a.distance(&a), Some(0.0));
    }

    #[test]
    fn test_l2_distance() {
        let a = Descriptor::Float(vec![0.0, 3.0]);
        let b = Descriptor::Float(vec![4.0, 0.0]);

        assert_eq!(a.distance(&b), Some(5.0));
    }

    #[test]
    fn test_incompatible_descriptors() {
        let a = Descriptor::Binary(vec![0; 32]);
        let b = Descriptor::Binary(vec![0; 16]);
        let c = Descriptor::Float(vec![0.0; 32]);

        assert_eq!(a.distance(&b), None);
        assert_eq!(a.distance(&c), None);
    }
}
