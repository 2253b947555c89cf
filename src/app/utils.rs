use config::{Config, ConfigError, Environment, File, FileFormat};
use rand::{seq::SliceRandom, Rng};
use serde::de::DeserializeOwned;

use crate::app::types::ROOM_CODE_ALPHABET;

/// Read the configuration from a toml file, overridden by environment variables when a prefix is
/// given (`PREFIX_SECTION__KEY`)
pub fn read_config<T>(file_name: &str, env_prefix: Option<&str>) -> Result<T, ConfigError>
where
    T: DeserializeOwned,
{
    let mut config_builder = Config::builder()
        .add_source(File::new(file_name, FileFormat::Toml).required(false));

    if let Some(env_prefix) = env_prefix {
        config_builder = config_builder.add_source(
            Environment::with_prefix(env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );
    }

    config_builder.build()?.try_deserialize()
}

/// Uuid v7 is time ordered, so ids sort by creation
pub fn generate_time_ordered_id() -> String {
    uuid::Uuid::now_v7().as_simple().to_string()
}

pub fn generate_room_code<R: Rng + ?Sized>(rng: &mut R, length: usize) -> String {
    (0..length)
        .map(|_| char::from(ROOM_CODE_ALPHABET[rng.gen_range(0..ROOM_CODE_ALPHABET.len())]))
        .collect()
}

const FACES: [&str; 6] = ["U", "D", "L", "R", "F", "B"];
const SUFFIXES: [&str; 3] = ["", "'", "2"];

/// Random-move scramble in standard notation. The same face is never turned twice in a row.
pub fn generate_scramble<R: Rng + ?Sized>(rng: &mut R, length: usize) -> String {
    let mut moves = Vec::with_capacity(length);
    let mut previous_face = None;

    while moves.len() < length {
        let Some(&face) = FACES.choose(rng) else {
            break;
        };
        if previous_face == Some(face) {
            continue;
        }
        let suffix = SUFFIXES.choose(rng).copied().unwrap_or_default();
        moves.push(format!("{face}{suffix}"));
        previous_face = Some(face);
    }

    moves.join(" ")
}
