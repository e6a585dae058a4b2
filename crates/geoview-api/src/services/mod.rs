pub mod shapefile_export;
