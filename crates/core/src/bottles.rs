//! Bottle quantity calculator for a table of guests.
//!
//! Used by the setup flow to pre-fill the suggested bottle count and by the
//! journey sequencer to size a tasting path before the guest confirms their
//! own number.

pub const DEFAULT_COURSES_PER_PERSON: f64 = 2.0;
pub const GLASSES_PER_PERSON_PER_COURSE: f64 = 1.5;
pub const GLASSES_PER_BOTTLE: f64 = 6.0;

/// Bottles needed for `guest_count` people at the default two courses each.
pub fn bottles_needed(guest_count: u32) -> u32 {
    bottles_needed_with_courses(guest_count, DEFAULT_COURSES_PER_PERSON)
}

/// Bottles needed with an explicit courses-per-person figure.
///
/// A fractional part strictly greater than 0.5 rounds up; everything else,
/// including exactly 0.5, rounds down. The half-down rule is intentional and
/// guest-facing copy depends on it; do not replace with round-half-up.
pub fn bottles_needed_with_courses(guest_count: u32, courses_per_person: f64) -> u32 {
    let total_glasses = f64::from(guest_count) * courses_per_person * GLASSES_PER_PERSON_PER_COURSE;
    let bottles_decimal = total_glasses / GLASSES_PER_BOTTLE;

    let whole = bottles_decimal.floor();
    let fractional = bottles_decimal - whole;

    if fractional > 0.5 {
        whole as u32 + 1
    } else {
        whole as u32
    }
}

#[cfg(test)]
mod tests {
    use super::{bottles_needed, bottles_needed_with_courses};

    #[test]
    fn two_guests_need_one_bottle() {
        // (2 * 2.0 * 1.5) / 6.0 = 1.0, fractional 0.0 rounds down
        assert_eq!(bottles_needed(2), 1);
    }

    #[test]
    fn four_guests_need_two_bottles() {
        assert_eq!(bottles_needed(4), 2);
    }

    #[test]
    fn exact_half_rounds_down_for_three_guests() {
        // (3 * 2.0 * 1.5) / 6.0 = 1.5, fractional exactly 0.5 is not > 0.5
        assert_eq!(bottles_needed(3), 1);
    }

    #[test]
    fn exact_half_rounds_down_for_five_guests() {
        assert_eq!(bottles_needed(5), 2);
    }

    #[test]
    fn fraction_above_half_rounds_up() {
        // (7 * 2.0 * 1.5) / 6.0 = 3.5 rounds down; (3 * 2.5 * 1.5) / 6.0 = 1.875 rounds up
        assert_eq!(bottles_needed(7), 3);
        assert_eq!(bottles_needed_with_courses(3, 2.5), 2);
    }

    #[test]
    fn single_guest_single_course_rounds_down_to_zero() {
        // (1 * 1.0 * 1.5) / 6.0 = 0.25
        assert_eq!(bottles_needed_with_courses(1, 1.0), 0);
    }
}
