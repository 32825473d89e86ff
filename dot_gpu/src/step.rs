pub struct DivStep {
    denom: usize,
    next: usize,
}

impl Iterator for DivStep {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next == 0 {
            return None;
        }
        let next = self.next;
        self.next /= self.denom;
        Some(next)
    }
}

// Returns an iterator that generates numbers by repeatedly dividing by the
// given denominator, stopping once the value reaches zero.
pub fn div_step(init: usize, denom: usize) -> DivStep {
    DivStep { denom, next: init }
}

#[cfg(test)]
mod tests {
    use super::div_step;

    #[test]
    fn div_step_halves_until_zero() {
        let strides: Vec<usize> = div_step(512, 2).collect();
        assert_eq!(strides, vec![512, 256, 128, 64, 32, 16, 8, 4, 2, 1]);
    }

    #[test]
    fn div_step_from_zero_is_empty() {
        assert_eq!(div_step(0, 2).next(), None);
    }
}
