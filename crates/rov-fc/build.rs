// mavlink generates its dialects in its own build script. Cargo unifies
// features across build dependencies, so listing mavlink-bindgen here with
// `emit-extensions` makes that build emit MAVLink 2 extension fields
// (RC_CHANNELS_OVERRIDE chan9_raw..chan18_raw among them).
fn main() {
    println!("cargo:rerun-if-changed=build.rs");
}
