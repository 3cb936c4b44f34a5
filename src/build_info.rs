mod data {
    include!(concat!(env!("OUT_DIR"), "/build_info.rs"));
}

/// Build metadata recorded by the build script, as a JSON object.
pub fn build_info_json() -> &'static str {
    data::BUILD_INFO_JSON
}
