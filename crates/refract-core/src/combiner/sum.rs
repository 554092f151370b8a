use crate::error::Result;
use crate::math::{l2_normalize, l2_normalize_in_place};
use crate::types::Embedding;

use super::{check_batch, Combiner};

/// Zero-parameter baseline: `normalize(image) + normalize(text)`.
#[derive(Debug, Clone, Copy)]
pub struct ElementWiseSum {
    renormalize: bool,
}

impl ElementWiseSum {
    pub fn new(renormalize: bool) -> Self {
        Self { renormalize }
    }
}

impl Default for ElementWiseSum {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Combiner for ElementWiseSum {
    fn combine_batch(&self, images: &[Embedding], texts: &[Embedding]) -> Result<Vec<Embedding>> {
        check_batch(images, texts)?;
        Ok(images
            .iter()
            .zip(texts)
            .map(|(image, text)| {
                let text = l2_normalize(text);
                let mut query = l2_normalize(image);
                for (q, t) in query.iter_mut().zip(&text) {
                    *q += t;
                }
                if self.renormalize {
                    l2_normalize_in_place(&mut query);
                }
                query
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "sum"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::l2_norm;

    #[test]
    fn test_sum_of_normalized_inputs() {
        let combiner = ElementWiseSum::new(false);
        let query = combiner.combine(&[3.0, 0.0], &[0.0, 0.5]).unwrap();
        assert!((query[0] - 1.0).abs() < 1e-6);
        assert!((query[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_renormalized_output_is_unit_norm() {
        let combiner = ElementWiseSum::default();
        let query = combiner.combine(&[3.0, 0.0], &[0.0, 0.5]).unwrap();
        assert!((l2_norm(&query) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_batch_is_order_and_result_neutral() {
        let combiner = ElementWiseSum::default();
        let images = vec![vec![1.0, 2.0, 3.0], vec![-1.0, 0.5, 0.0], vec![0.0, 0.0, 4.0]];
        let texts = vec![vec![0.3, 0.3, 0.3], vec![2.0, -1.0, 1.0], vec![1.0, 0.0, 0.0]];

        let batched = combiner.combine_batch(&images, &texts).unwrap();
        assert_eq!(batched.len(), 3);
        for (i, row) in batched.iter().enumerate() {
            let single = combiner.combine(&images[i], &texts[i]).unwrap();
            assert_eq!(row, &single);
        }
    }

    #[test]
    fn test_batch_mismatch_rejected() {
        let combiner = ElementWiseSum::default();
        assert!(combiner
            .combine_batch(&[vec![1.0]], &[vec![1.0], vec![2.0]])
            .is_err());
    }
}
