/// Every bookable room, in canonical order: floor by floor, and within a
/// floor building A, B, C, rooms 01–04.
#[rustfmt::skip]
const CLASSROOMS: [&str; 48] = [
    "A101", "A102", "A103", "A104", "B101", "B102", "B103", "B104",
    "C101", "C102", "C103", "C104", "A201", "A202", "A203", "A204",
    "B201", "B202", "B203", "B204", "C201", "C202", "C203", "C204",
    "A301", "A302", "A303", "A304", "B301", "B302", "B303", "B304",
    "C301", "C302", "C303", "C304", "A401", "A402", "A403", "A404",
    "B401", "B402", "B403", "B404", "C401", "C402", "C403", "C404",
];

pub fn classrooms() -> &'static [&'static str] {
    &CLASSROOMS
}

/// Uppercase `input` and look it up. Returns the catalog's own string so
/// callers can hold `&'static str` codes.
pub fn canonicalize(input: &str) -> Option<&'static str> {
    let upper = input.trim().to_uppercase();
    CLASSROOMS.iter().copied().find(|c| *c == upper)
}

/// Position in canonical order, used to sort result sets.
pub fn position(code: &str) -> Option<usize> {
    CLASSROOMS.iter().position(|c| *c == code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn catalog_has_48_unique_codes() {
        let set: HashSet<_> = classrooms().iter().collect();
        assert_eq!(classrooms().len(), 48);
        assert_eq!(set.len(), 48);
    }

    #[test]
    fn catalog_covers_every_building_floor_room() {
        for building in ['A', 'B', 'C'] {
            for floor in 1..=4 {
                for room in 1..=4 {
                    let code = format!("{building}{floor}0{room}");
                    assert!(canonicalize(&code).is_some(), "missing {code}");
                }
            }
        }
    }

    #[test]
    fn canonicalize_uppercases() {
        assert_eq!(canonicalize("a401"), Some("A401"));
        assert_eq!(canonicalize(" b204 "), Some("B204"));
    }

    #[test]
    fn canonicalize_rejects_unknown() {
        assert_eq!(canonicalize("D101"), None);
        assert_eq!(canonicalize("A105"), None);
        assert_eq!(canonicalize(""), None);
    }

    #[test]
    fn position_follows_canonical_order() {
        assert_eq!(position("A101"), Some(0));
        assert_eq!(position("C404"), Some(47));
        assert!(position("A201") > position("C104"));
    }
}
