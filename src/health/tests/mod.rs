mod state_machine;
mod system;
