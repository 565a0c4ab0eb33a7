//! Interval relationship classification.
//!
//! Ranges are half-open `[start, end)` over non-negative positions. The
//! classifier is total over valid ranges and mirror-symmetric: swapping the
//! arguments always yields [`RangeRelationship::mirror`] of the original.

/// How range `r1` relates to range `r2` (Allen's interval algebra).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RangeRelationship {
    /// `r1` ends strictly before `r2` starts.
    Precedes,
    /// `r1` starts strictly after `r2` ends.
    PrecededBy,
    /// `r1` ends exactly where `r2` starts.
    Meets,
    /// `r1` starts exactly where `r2` ends.
    MetBy,
    /// `r1` starts first and ends inside `r2`.
    Overlaps,
    /// `r2` starts first and ends inside `r1`.
    OverlappedBy,
    /// Same start, `r1` ends first.
    Starts,
    /// Same start, `r2` ends first.
    StartedBy,
    /// `r1` strictly encloses `r2`.
    Contains,
    /// `r2` strictly encloses `r1`.
    ContainedBy,
    /// Same end, `r1` starts later.
    Finishes,
    /// Same end, `r2` starts later.
    FinishedBy,
    /// Identical ranges.
    EqualTo,
}

impl RangeRelationship {
    /// The relationship obtained by swapping the two ranges.
    pub fn mirror(self) -> Self {
        use RangeRelationship::*;
        match self {
            Precedes => PrecededBy,
            PrecededBy => Precedes,
            Meets => MetBy,
            MetBy => Meets,
            Overlaps => OverlappedBy,
            OverlappedBy => Overlaps,
            Starts => StartedBy,
            StartedBy => Starts,
            Contains => ContainedBy,
            ContainedBy => Contains,
            Finishes => FinishedBy,
            FinishedBy => Finishes,
            EqualTo => EqualTo,
        }
    }
}

/// Where a single position falls relative to a range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RangeIndexRelationship {
    Before,
    Start,
    Within,
    End,
    After,
}

/// Classify `[s1, e1)` against `[s2, e2)`.
///
/// Both ranges must be non-empty for the result to be meaningful; empty
/// ranges still classify (the function is total) but several cases collapse.
pub fn range_range(s1: usize, e1: usize, s2: usize, e2: usize) -> RangeRelationship {
    use RangeRelationship::*;
    if s1 == s2 {
        if e1 == e2 {
            EqualTo
        } else if e1 > e2 {
            StartedBy
        } else {
            Starts
        }
    } else if s1 > s2 {
        if s1 > e2 {
            PrecededBy
        } else if e1 == e2 {
            Finishes
        } else if s1 == e2 {
            MetBy
        } else if e1 < e2 {
            ContainedBy
        } else {
            OverlappedBy
        }
    } else if e1 < s2 {
        Precedes
    } else if e1 == e2 {
        FinishedBy
    } else if e1 == s2 {
        Meets
    } else if e1 > e2 {
        Contains
    } else {
        Overlaps
    }
}

/// Classify `index` against `[start, end)`.
pub fn range_index(start: usize, end: usize, index: usize) -> RangeIndexRelationship {
    if index < start {
        RangeIndexRelationship::Before
    } else if index == start {
        RangeIndexRelationship::Start
    } else if index < end {
        RangeIndexRelationship::Within
    } else if index == end {
        RangeIndexRelationship::End
    } else {
        RangeIndexRelationship::After
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use RangeRelationship::*;

    #[test]
    fn classifies_all_thirteen_cases() {
        assert_eq!(range_range(0, 2, 4, 6), Precedes);
        assert_eq!(range_range(4, 6, 0, 2), PrecededBy);
        assert_eq!(range_range(0, 3, 3, 6), Meets);
        assert_eq!(range_range(3, 6, 0, 3), MetBy);
        assert_eq!(range_range(0, 4, 2, 6), Overlaps);
        assert_eq!(range_range(2, 6, 0, 4), OverlappedBy);
        assert_eq!(range_range(0, 2, 0, 6), Starts);
        assert_eq!(range_range(0, 6, 0, 2), StartedBy);
        assert_eq!(range_range(0, 6, 2, 4), Contains);
        assert_eq!(range_range(2, 4, 0, 6), ContainedBy);
        assert_eq!(range_range(4, 6, 0, 6), Finishes);
        assert_eq!(range_range(0, 6, 4, 6), FinishedBy);
        assert_eq!(range_range(1, 5, 1, 5), EqualTo);
    }

    #[test]
    fn swapping_ranges_mirrors_the_relationship() {
        for s1 in 0..5 {
            for e1 in s1 + 1..6 {
                for s2 in 0..5 {
                    for e2 in s2 + 1..6 {
                        let forward = range_range(s1, e1, s2, e2);
                        let backward = range_range(s2, e2, s1, e1);
                        assert_eq!(forward.mirror(), backward, "[{s1},{e1}) vs [{s2},{e2})");
                    }
                }
            }
        }
    }

    #[test]
    fn index_against_range() {
        assert_eq!(range_index(2, 5, 1), RangeIndexRelationship::Before);
        assert_eq!(range_index(2, 5, 2), RangeIndexRelationship::Start);
        assert_eq!(range_index(2, 5, 4), RangeIndexRelationship::Within);
        assert_eq!(range_index(2, 5, 5), RangeIndexRelationship::End);
        assert_eq!(range_index(2, 5, 9), RangeIndexRelationship::After);
    }
}
