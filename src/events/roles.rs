use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

/// Lowest note of the recognized drum range (GM2 Acoustic Bass Drum).
pub const DRUM_NOTE_MIN: u8 = 35;
/// Highest note of the recognized drum range (GM2 Open Triangle).
pub const DRUM_NOTE_MAX: u8 = 81;

/// Prefix for notes with no canonical role.
pub const UNKNOWN_ROLE_PREFIX: &str = "Unknown:";

pub const KICK: &str = "Kick";
pub const SNARE: &str = "Snare";
pub const CLOSED_HAT: &str = "ClosedHat";
pub const PEDAL_HAT: &str = "PedalHat";
pub const OPEN_HAT: &str = "OpenHat";
pub const CRASH: &str = "Crash";
pub const RIDE: &str = "Ride";

/// Roles callers treat as the core kit.
const PRIMARY_ROLES: [&str; 7] = [KICK, SNARE, CLOSED_HAT, PEDAL_HAT, OPEN_HAT, CRASH, RIDE];

/// GM Level-2 percussion notes grouped into canonical roles.
/// Articulation variants share a role (both snares, both crashes, the two floor toms).
const NOTE_TABLE: &[(u8, &str)] = &[
    (35, KICK),         // Acoustic Bass Drum
    (36, KICK),         // Bass Drum 1
    (37, "SideStick"),
    (38, SNARE),        // Acoustic Snare
    (39, "HandClap"),
    (40, SNARE),        // Electric Snare
    (41, "FloorTom"),   // Low Floor Tom
    (42, CLOSED_HAT),
    (43, "FloorTom"),   // High Floor Tom
    (44, PEDAL_HAT),
    (45, "LowTom"),
    (46, OPEN_HAT),
    (47, "LowTom"),     // Low-Mid Tom
    (48, "HighTom"),    // Hi-Mid Tom
    (49, CRASH),        // Crash Cymbal 1
    (50, "HighTom"),
    (51, RIDE),         // Ride Cymbal 1
    (52, "China"),
    (53, "RideBell"),
    (54, "Tambourine"),
    (55, "Splash"),
    (56, "Cowbell"),
    (57, CRASH),        // Crash Cymbal 2
    (58, "Vibraslap"),
    (59, RIDE),         // Ride Cymbal 2
    (60, "Bongo"),      // Hi Bongo
    (61, "Bongo"),      // Low Bongo
    (62, "Conga"),      // Mute Hi Conga
    (63, "Conga"),      // Open Hi Conga
    (64, "Conga"),      // Low Conga
    (65, "Timbale"),    // High Timbale
    (66, "Timbale"),    // Low Timbale
    (67, "Agogo"),      // High Agogo
    (68, "Agogo"),      // Low Agogo
    (69, "Shaker"),     // Cabasa
    (70, "Shaker"),     // Maracas
    (71, "Whistle"),    // Short Whistle
    (72, "Whistle"),    // Long Whistle
    (73, "Guiro"),      // Short Guiro
    (74, "Guiro"),      // Long Guiro
    (75, "Claves"),
    (76, "WoodBlock"),  // Hi Wood Block
    (77, "WoodBlock"),  // Low Wood Block
    (78, "Cuica"),      // Mute Cuica
    (79, "Cuica"),      // Open Cuica
    (80, "Triangle"),   // Mute Triangle
    (81, "Triangle"),   // Open Triangle
];

/// Note ↔ role lookup built once from `NOTE_TABLE`.
#[derive(Debug)]
pub struct RoleTable {
    note_to_role: HashMap<u8, &'static str>,
    /// Role → notes, ascending. BTreeMap keeps `all_roles` ordered.
    role_to_notes: BTreeMap<&'static str, Vec<u8>>,
}

static TABLE: OnceLock<RoleTable> = OnceLock::new();

fn table() -> &'static RoleTable {
    TABLE.get_or_init(RoleTable::new)
}

impl RoleTable {
    fn new() -> Self {
        let mut note_to_role = HashMap::new();
        let mut role_to_notes: BTreeMap<&'static str, Vec<u8>> = BTreeMap::new();
        for &(note, role) in NOTE_TABLE {
            note_to_role.insert(note, role);
            role_to_notes.entry(role).or_default().push(note);
        }
        for notes in role_to_notes.values_mut() {
            notes.sort_unstable();
        }
        Self {
            note_to_role,
            role_to_notes,
        }
    }
}

/// True when `note` is inside the recognized drum range (35–81).
pub fn is_in_drum_range(note: u8) -> bool {
    (DRUM_NOTE_MIN..=DRUM_NOTE_MAX).contains(&note)
}

/// Map a note number to its canonical role.
/// Unmapped notes (in range or not) become `"Unknown:<note>"`; use
/// [`is_in_drum_range`] to tell the two apart.
pub fn map_note_to_role(note: u8) -> String {
    match table().note_to_role.get(&note) {
        Some(role) => (*role).to_string(),
        None => format!("{UNKNOWN_ROLE_PREFIX}{note}"),
    }
}

/// Whether the note belongs to the core kit (kick, snare, hats, crash, ride).
pub fn is_primary_role(note: u8) -> bool {
    table()
        .note_to_role
        .get(&note)
        .is_some_and(|role| PRIMARY_ROLES.contains(role))
}

pub fn is_unknown_role(role: &str) -> bool {
    role.starts_with(UNKNOWN_ROLE_PREFIX)
}

/// All notes that map to `role`, ascending. Unknown roles resolve to their single note.
pub fn notes_for_role(role: &str) -> Vec<u8> {
    if let Some(notes) = table().role_to_notes.get(role) {
        return notes.clone();
    }
    role.strip_prefix(UNKNOWN_ROLE_PREFIX)
        .and_then(|n| n.parse::<u8>().ok())
        .filter(|n| !table().note_to_role.contains_key(n))
        .map(|n| vec![n])
        .unwrap_or_default()
}

/// Every canonical role name, alphabetical.
pub fn all_roles() -> Vec<&'static str> {
    table().role_to_notes.keys().copied().collect()
}
