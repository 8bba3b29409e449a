mod delivery;
mod lifecycle;
mod sweep;
