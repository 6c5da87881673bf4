/*
    Lorraine
    https://github.com/dbalsom/lorraine

    Copyright 2022-2025 Daniel Balsom

    Permission is hereby granted, free of charge, to any person obtaining a
    copy of this software and associated documentation files (the “Software”),
    to deal in the Software without restriction, including without limitation
    the rights to use, copy, modify, merge, publish, distribute, sublicense,
    and/or sell copies of the Software, and to permit persons to whom the
    Software is furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in
    all copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
    FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
    DEALINGS IN THE SOFTWARE.

    --------------------------------------------------------------------------

    clock.rs

    Simulation time units.

    All timed interfaces in the core deal in half-cycles of the master bus
    clock; a half-cycle is the finest granularity at which any modeled bus
    event can occur.

*/

use std::{
    fmt,
    iter::Sum,
    ops::{Add, AddAssign, Sub, SubAssign},
};

/// A duration measured in half-cycles of the master clock.
///
/// Signed so that slot-arbitration arithmetic can represent a deficit while
/// a device catches up to the current bus time.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HalfCycles(pub i64);

impl HalfCycles {
    pub const ZERO: HalfCycles = HalfCycles(0);

    #[inline]
    pub fn from_cycles(cycles: i64) -> Self {
        HalfCycles(cycles * 2)
    }

    /// Whole cycles represented, truncating any trailing half-cycle.
    #[inline]
    pub fn as_cycles(&self) -> i64 {
        self.0 / 2
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Add for HalfCycles {
    type Output = HalfCycles;
    #[inline]
    fn add(self, rhs: HalfCycles) -> HalfCycles {
        HalfCycles(self.0 + rhs.0)
    }
}

impl AddAssign for HalfCycles {
    #[inline]
    fn add_assign(&mut self, rhs: HalfCycles) {
        self.0 += rhs.0;
    }
}

impl Sub for HalfCycles {
    type Output = HalfCycles;
    #[inline]
    fn sub(self, rhs: HalfCycles) -> HalfCycles {
        HalfCycles(self.0 - rhs.0)
    }
}

impl SubAssign for HalfCycles {
    #[inline]
    fn sub_assign(&mut self, rhs: HalfCycles) {
        self.0 -= rhs.0;
    }
}

impl Sum for HalfCycles {
    fn sum<I: Iterator<Item = HalfCycles>>(iter: I) -> HalfCycles {
        iter.fold(HalfCycles::ZERO, |acc, hc| acc + hc)
    }
}

impl fmt::Display for HalfCycles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}hc", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn halfcycle_arithmetic() {
        let a = HalfCycles::from_cycles(4);
        let b = HalfCycles(3);

        assert_eq!(a.0, 8);
        assert_eq!((a + b).0, 11);
        assert_eq!((a - b).0, 5);
        assert_eq!((a + b).as_cycles(), 5);

        let mut c = HalfCycles::ZERO;
        c += a;
        c -= HalfCycles::from_cycles(1);
        assert_eq!(c, HalfCycles(6));
    }

    #[test]
    fn halfcycle_sum() {
        let total: HalfCycles = [HalfCycles(1), HalfCycles(2), HalfCycles(3)].into_iter().sum();
        assert_eq!(total, HalfCycles(6));
    }
}
