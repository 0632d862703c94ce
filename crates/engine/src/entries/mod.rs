//! Concrete entry types

pub mod person;
pub mod work;

pub use person::{EditPersonCommand, Person, PersonDto, PersonRepository};
pub use work::{
    EditWorkCommand, Edition, EditionDto, EditionMutator, Volume, VolumeDto, VolumeMutator, Work,
    WorkDto, WorkRepository,
};
