mod concat_map;
mod debounce;
mod delay;
mod flat_map;
pub(crate) mod group_by;
mod schedule;
mod side_effect;
pub(crate) mod share;
mod switch_map;
mod take;
mod transform;
