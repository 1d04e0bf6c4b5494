mod commands;
mod handlers;

pub use commands::{Cli, Commands, SpeciesAction, SpeciesCommand};
pub use handlers::{
    handle_close, handle_compensation, handle_decide, handle_file, handle_get, handle_init,
    handle_list, handle_serve, handle_species_get, handle_species_list, handle_species_search,
    handle_species_seed, handle_visit,
};
