fn main() {
    if let Err(err) = filament_station_lib::run() {
        eprintln!("filament-station failed: {err:#}");
        std::process::exit(1);
    }
}
