
mod state_prepare;
