mod adapter;
mod mapping;
mod windcalm;

pub(crate) use adapter::WindcalmAdapter;
pub(crate) use windcalm::WindcalmAccessory;
