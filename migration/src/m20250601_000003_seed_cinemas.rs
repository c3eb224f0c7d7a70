use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

// Reference data for the city the sync pipeline scrapes. Coordinates are
// (lng, lat) WGS84.
const CINEMAS: &[(&str, &str, &str, f64, f64)] = &[
    (
        "cgv-vincom-da-nang",
        "CGV Vincom Đà Nẵng",
        "Tầng 4, TTTM Vincom, 910A Ngô Quyền, Sơn Trà, Đà Nẵng",
        108.2308,
        16.0712,
    ),
    (
        "lotte-cinema-da-nang",
        "Lotte Cinema Đà Nẵng",
        "Tầng 5&6, Lotte Mart, 6 Nại Nam, Hải Châu, Đà Nẵng",
        108.2290,
        16.0340,
    ),
    (
        "galaxy-da-nang",
        "Galaxy Cinema Đà Nẵng",
        "Tầng 3, Coopmart, 478 Điện Biên Phủ, Thanh Khê, Đà Nẵng",
        108.1866,
        16.0668,
    ),
    (
        "metiz-cinema",
        "Metiz Cinema",
        "Tầng 2, Novotel, 36 Bạch Đằng, Hải Châu, Đà Nẵng",
        108.2241,
        16.0778,
    ),
    (
        "starlight-da-nang",
        "Starlight Đà Nẵng",
        "Nguyễn Văn Linh, Hải Châu, Đà Nẵng",
        108.2108,
        16.0601,
    ),
];

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for (slug, name, address, lng, lat) in CINEMAS {
            let insert = Query::insert()
                .into_table(Cinema::Table)
                .columns([
                    Cinema::Slug,
                    Cinema::Name,
                    Cinema::Address,
                    Cinema::City,
                    Cinema::Lng,
                    Cinema::Lat,
                ])
                .values_panic([
                    (*slug).into(),
                    (*name).into(),
                    (*address).into(),
                    "Đà Nẵng".into(),
                    (*lng).into(),
                    (*lat).into(),
                ])
                .to_owned();
            manager.exec_stmt(insert).await?;
        }

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for (slug, ..) in CINEMAS {
            let delete = Query::delete()
                .from_table(Cinema::Table)
                .cond_where(Expr::col(Cinema::Slug).eq(*slug))
                .to_owned();
            manager.exec_stmt(delete).await?;
        }

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Cinema {
    Table,
    Slug,
    Name,
    Address,
    City,
    Lng,
    Lat,
}
