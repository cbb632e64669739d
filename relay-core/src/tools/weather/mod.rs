pub mod structs;
pub mod weather;


pub use structs::WeatherParams;
pub use weather::{WeatherTool, OPEN_METEO_URL};
